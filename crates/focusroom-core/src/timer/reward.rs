//! Reward reconciliation.
//!
//! Completion is client-authoritative: the reward is computed locally and
//! announced at once, then the store is told in the background. A failed
//! commit is logged and dropped; the user keeps the focus time either way.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::events::{Event, EventSink};
use crate::storage::RewardConfig;
use crate::store::{Profile, SessionStore};

/// Maps a completed session's work duration to the XP shown to the user.
pub trait RewardFormula: Send + Sync {
    fn xp_for(&self, work_duration: u32) -> u64;
}

/// Fixed XP per focus minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearReward {
    pub xp_per_minute: u64,
}

impl Default for LinearReward {
    fn default() -> Self {
        Self { xp_per_minute: 10 }
    }
}

impl From<&RewardConfig> for LinearReward {
    fn from(config: &RewardConfig) -> Self {
        Self {
            xp_per_minute: config.xp_per_minute,
        }
    }
}

impl RewardFormula for LinearReward {
    fn xp_for(&self, work_duration: u32) -> u64 {
        u64::from(work_duration).saturating_mul(self.xp_per_minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub session_id: String,
    pub xp: u64,
}

/// What the background completion commit achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed {
        new_level: Option<u32>,
        /// `None` when the profile refresh after the commit failed.
        profile: Option<Profile>,
    },
    Failed(String),
}

/// Returned by `complete()`. The local state is already idle; the handle
/// only lets the caller observe the background commit.
#[derive(Debug)]
pub struct CompletionHandle {
    pub reward: Reward,
    /// `None` if no Tokio runtime was available to run the commit.
    pub commit: Option<JoinHandle<CommitOutcome>>,
}

impl CompletionHandle {
    /// Wait for the background commit.
    pub async fn outcome(self) -> CommitOutcome {
        match self.commit {
            Some(handle) => handle
                .await
                .unwrap_or_else(|e| CommitOutcome::Failed(format!("commit task failed: {e}"))),
            None => CommitOutcome::Failed("no runtime to commit completion".into()),
        }
    }
}

/// Start the best-effort remote commit for `session_id`.
///
/// Every event published from the task carries the session id it was issued
/// for, and the task never touches timer state, so a late answer cannot leak
/// into a session started afterwards.
pub(crate) fn spawn_commit(
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    events: EventSink,
    session_id: String,
) -> Option<JoinHandle<CommitOutcome>> {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => Some(runtime.spawn(commit(store, clock, events, session_id))),
        Err(_) => {
            tracing::warn!(%session_id, "no async runtime; completion not committed");
            None
        }
    }
}

async fn commit(
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    events: EventSink,
    session_id: String,
) -> CommitOutcome {
    let receipt = match store.complete_session(&session_id).await {
        Ok(receipt) => receipt,
        Err(e) => {
            tracing::warn!(%session_id, "completion commit failed: {e}");
            return CommitOutcome::Failed(e.to_string());
        }
    };
    tracing::info!(%session_id, new_level = ?receipt.new_level, "completion committed");

    let profile = match store.fetch_profile().await {
        Ok(profile) => {
            events.publish(Event::ProfileRefreshed {
                session_id: session_id.clone(),
                profile,
                at: clock.now(),
            });
            Some(profile)
        }
        Err(e) => {
            tracing::warn!(%session_id, "profile refresh failed: {e}");
            None
        }
    };

    if let Some(new_level) = receipt.new_level {
        events.publish(Event::LevelUp {
            session_id,
            new_level,
            at: clock.now(),
        });
    }

    CommitOutcome::Committed {
        new_level: receipt.new_level,
        profile,
    }
}
