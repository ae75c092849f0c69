use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::store::Profile;
use crate::timer::TimerMode;

/// Every state change in the engine produces an Event.
/// The UI consumes them from the channel returned by [`EventSink::channel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: String,
        work_duration: u32,
        break_duration: u32,
        at: DateTime<Utc>,
    },
    SessionPaused {
        session_id: String,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    SessionResumed {
        session_id: String,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    /// Work expired into break, or a phase reached completion.
    PhaseChanged {
        session_id: String,
        from: TimerMode,
        to: TimerMode,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    /// An active session was found on startup and its state rebuilt.
    SessionRecovered {
        session_id: String,
        mode: TimerMode,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    /// Emitted as soon as a session is completed locally, before the
    /// server has confirmed anything.
    RewardGranted {
        session_id: String,
        xp: u64,
        at: DateTime<Utc>,
    },
    ProfileRefreshed {
        session_id: String,
        profile: Profile,
        at: DateTime<Utc>,
    },
    /// The server confirmed a level change for the completed session.
    LevelUp {
        session_id: String,
        new_level: u32,
        at: DateTime<Utc>,
    },
    SessionAbandoned {
        session_id: String,
        at: DateTime<Utc>,
    },
    /// A user action failed; the message is also stored in the timer state.
    ActionFailed {
        action: String,
        message: String,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        session_id: Option<String>,
        mode: TimerMode,
        time_remaining: u64,
        is_running: bool,
        error: Option<String>,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// The session this event belongs to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Event::SessionStarted { session_id, .. }
            | Event::SessionPaused { session_id, .. }
            | Event::SessionResumed { session_id, .. }
            | Event::PhaseChanged { session_id, .. }
            | Event::SessionRecovered { session_id, .. }
            | Event::RewardGranted { session_id, .. }
            | Event::ProfileRefreshed { session_id, .. }
            | Event::LevelUp { session_id, .. }
            | Event::SessionAbandoned { session_id, .. } => Some(session_id),
            Event::StateSnapshot { session_id, .. } => session_id.as_deref(),
            Event::ActionFailed { .. } => None,
        }
    }
}

/// Publishing half of the event stream.
///
/// A sink without a receiver, or whose receiver was dropped, silently
/// discards events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl EventSink {
    /// A connected sink and the receiver the UI reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops everything.
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: Event) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!("event receiver dropped");
            }
        }
    }
}
