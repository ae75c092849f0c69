//! Foreground/background reconciliation.
//!
//! Periodic callbacks may not fire at all while the process is in the
//! background (throttled tab, suspended terminal job). Returning to the
//! foreground recomputes immediately instead of waiting for the next tick.

use serde::{Deserialize, Serialize};

use super::controller::SessionController;
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Foreground,
    Background,
}

impl SessionController {
    /// Feed a visibility signal from the runtime.
    ///
    /// Only a background-to-foreground transition triggers a recomputation;
    /// it returns `Some(Event::PhaseChanged)` if a phase expired meanwhile.
    pub fn on_visibility_change(&mut self, visibility: Visibility) -> Option<Event> {
        let previous = std::mem::replace(&mut self.visibility, visibility);
        if previous != Visibility::Background || visibility != Visibility::Foreground {
            return None;
        }
        tracing::debug!("returned to foreground; reconciling");
        self.tick()
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }
}
