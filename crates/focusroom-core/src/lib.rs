//! # Focusroom Core Library
//!
//! The focus session timer engine behind Focusroom. It runs a work/break
//! countdown that survives suspended or throttled timers, rebuilds itself
//! from the remote session record on startup, and grants the completion
//! reward exactly once.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-based state machine. The caller invokes
//!   `tick()` periodically, but ticks only trigger recomputation; remaining
//!   time always comes from `target_end_time - now`.
//! - **Session Store**: The remote record of sessions (HTTP), with SQLite and
//!   in-memory stand-ins.
//! - **Storage**: TOML configuration and the local SQLite store.
//!
//! ## Key Components
//!
//! - [`SessionController`]: Session lifecycle state machine
//! - [`compute_phase`]: Pure phase calculator
//! - [`SessionStore`]: Contract with the remote session store
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod storage;
pub mod store;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, StateError, StoreError, ValidationError};
pub use events::{Event, EventSink};
pub use storage::{Backend, Config, LocalSessionStore};
pub use store::{CompletionReceipt, HttpSessionStore, MemorySessionStore, Profile, SessionStore, StoreOp};
pub use timer::{
    compute_phase, CommitOutcome, CompletionHandle, NewSession, PhaseSnapshot, RecoveryOutcome,
    Reward, Session, SessionController, SessionStatus, TimerMode, TimerState, Visibility,
};
