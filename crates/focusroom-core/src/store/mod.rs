//! Session store contract.
//!
//! The engine does not own session persistence. It talks to a store through
//! [`SessionStore`]; the store decides ids, enforces one active session per
//! user and credits rewards.
//!
//! - [`HttpSessionStore`]: REST backend
//! - [`MemorySessionStore`]: in-process, with failure injection
//! - [`crate::storage::LocalSessionStore`]: SQLite, for offline use

mod http;
mod memory;

pub use http::HttpSessionStore;
pub use memory::{MemorySessionStore, StoreOp};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::timer::{NewSession, Session};

/// XP needed per level.
pub const XP_PER_LEVEL: u64 = 1000;

/// User progression as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub xp: u64,
    pub level: u32,
}

/// Store response to a completion commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReceipt {
    /// Set only when the completion moved the user to a new level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_level: Option<u32>,
}

/// Remote session persistence used by the timer engine.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, request: &NewSession) -> Result<Session, StoreError>;

    /// Active sessions, most recent first, at most `limit`.
    async fn list_active_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError>;

    async fn complete_session(&self, session_id: &str) -> Result<CompletionReceipt, StoreError>;

    async fn abandon_session(&self, session_id: &str) -> Result<(), StoreError>;

    async fn fetch_profile(&self) -> Result<Profile, StoreError>;
}

/// Level reached with `xp` experience points. Levels start at 1.
pub fn level_for_xp(xp: u64) -> u32 {
    u32::try_from(xp / XP_PER_LEVEL).unwrap_or(u32::MAX - 1) + 1
}
