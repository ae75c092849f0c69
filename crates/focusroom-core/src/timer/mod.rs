mod controller;
mod phase;
mod recovery;
mod reward;
mod session;
mod visibility;

pub use controller::{SessionController, TimerState};
pub use phase::{compute_phase, ms_to_secs, PhaseSnapshot};
pub use recovery::RecoveryOutcome;
pub use reward::{CommitOutcome, CompletionHandle, LinearReward, Reward, RewardFormula};
pub use session::{NewSession, Session, SessionStatus, TimerMode, MAX_PHASE_MIN};
pub use visibility::Visibility;
