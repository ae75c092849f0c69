//! Startup recovery.
//!
//! No timer state is persisted on the client. On startup the store is asked
//! for the user's active session and the phase calculator rebuilds the state
//! from the session's start time, so a reload or restart mid-session resumes
//! at the right phase with the right remaining time.

use serde::{Deserialize, Serialize};

use super::controller::SessionController;
use super::session::TimerMode;
use crate::error::{Result, StateError};
use crate::events::Event;

/// What `recover()` found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// No active session; the controller stays idle.
    NoActiveSession,
    /// The session is still in its work or break phase.
    Resumed {
        session_id: String,
        mode: TimerMode,
        remaining_secs: u64,
    },
    /// Both phases elapsed while the process was away. The UI should offer
    /// the completion flow right away.
    AwaitingCompletion { session_id: String },
}

impl SessionController {
    /// Rebuild local state from the store's active session.
    ///
    /// Meant to run once on startup, before any other action. A store failure
    /// is recorded in the state's `error` and returned; the controller stays
    /// idle.
    pub async fn recover(&mut self) -> Result<RecoveryOutcome> {
        if let Some(session_id) = self.session_id() {
            return Err(StateError::SessionActive(session_id).into());
        }

        let limit = self.recovery_limit;
        let sessions = match self.store().list_active_sessions(limit).await {
            Ok(sessions) => sessions,
            Err(e) => return Err(self.fail("recover", e.into())),
        };

        if sessions.len() > 1 {
            tracing::warn!(
                count = sessions.len(),
                "store reported several active sessions; recovering the most recent"
            );
        }
        let Some(session) = sessions.into_iter().max_by_key(|s| s.started_at) else {
            tracing::debug!("no active session to recover");
            return Ok(RecoveryOutcome::NoActiveSession);
        };

        let now = self.now();
        let session_id = session.id.clone();
        let started_at = session.started_at;
        self.install(session, started_at, now);

        let state = self.state();
        let (mode, remaining_secs) = (state.mode, state.time_remaining);
        tracing::info!(%session_id, mode = mode.as_str(), remaining_secs, "session recovered");
        self.emit(Event::SessionRecovered {
            session_id: session_id.clone(),
            mode,
            remaining_secs,
            at: now,
        });

        Ok(match mode {
            TimerMode::Completed => RecoveryOutcome::AwaitingCompletion { session_id },
            _ => RecoveryOutcome::Resumed {
                session_id,
                mode,
                remaining_secs,
            },
        })
    }
}
