//! Phase calculator.
//!
//! Derives the current phase of a session from its anchor instant and an
//! arbitrary `now`. Pure and deterministic: calling it twice with the same
//! inputs gives the same answer, so every recomputation trigger (tick,
//! foreground signal, user action) agrees.
//!
//! A phase is over once its remaining time rounds to zero seconds, so the
//! displayed countdown never shows 0 on a running phase. In particular at
//! exactly `anchor + work` the session is already in its break.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::session::TimerMode;

/// Result of a phase computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    /// One of `Work`, `Break` or `Completed`; never `Idle`.
    pub mode: TimerMode,
    /// Remaining time in the current phase, in milliseconds. Never negative.
    pub remaining_ms: i64,
    pub is_running: bool,
    /// When the current phase expires; `None` once completed.
    pub target_end_time: Option<DateTime<Utc>>,
}

impl PhaseSnapshot {
    /// Remaining whole seconds, rounded half-up.
    pub fn remaining_secs(&self) -> u64 {
        ms_to_secs(self.remaining_ms)
    }

    fn completed() -> Self {
        Self {
            mode: TimerMode::Completed,
            remaining_ms: 0,
            is_running: false,
            target_end_time: None,
        }
    }
}

/// Compute the phase of a session anchored at `started_at` as of `now`.
///
/// `work_secs` and `break_secs` are phase lengths in seconds. Instants before
/// the anchor count as zero elapsed time.
pub fn compute_phase(
    started_at: DateTime<Utc>,
    work_secs: i64,
    break_secs: i64,
    now: DateTime<Utc>,
) -> PhaseSnapshot {
    let elapsed_ms = (now - started_at).num_milliseconds().max(0);
    let total_work_ms = work_secs.max(0).saturating_mul(1000);
    let total_span_ms = total_work_ms.saturating_add(break_secs.max(0).saturating_mul(1000));

    // Ended once the remainder would display as 0 s.
    let ended = |end_ms: i64| ms_to_secs(end_ms - elapsed_ms) == 0;

    if ended(total_span_ms) {
        return PhaseSnapshot::completed();
    }

    let (mode, end_ms) = if ended(total_work_ms) {
        (TimerMode::Break, total_span_ms)
    } else {
        (TimerMode::Work, total_work_ms)
    };
    let remaining_ms = end_ms - elapsed_ms;

    PhaseSnapshot {
        mode,
        remaining_ms,
        is_running: ms_to_secs(remaining_ms) > 0,
        target_end_time: Some(started_at + Duration::milliseconds(end_ms)),
    }
}

/// Convert milliseconds to whole seconds, rounding half-up and clamping at zero.
pub fn ms_to_secs(ms: i64) -> u64 {
    (ms.max(0).saturating_add(500) / 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn fresh_session_is_in_work() {
        let snap = compute_phase(t0(), 1500, 300, t0());
        assert_eq!(snap.mode, TimerMode::Work);
        assert_eq!(snap.remaining_secs(), 1500);
        assert!(snap.is_running);
        assert_eq!(snap.target_end_time, Some(t0() + Duration::seconds(1500)));
    }

    #[test]
    fn work_boundary_belongs_to_break() {
        let snap = compute_phase(t0(), 1500, 300, t0() + Duration::seconds(1500));
        assert_eq!(snap.mode, TimerMode::Break);
        assert_eq!(snap.remaining_secs(), 300);
        assert_eq!(snap.target_end_time, Some(t0() + Duration::seconds(1800)));
    }

    #[test]
    fn span_end_is_completed() {
        let snap = compute_phase(t0(), 1500, 300, t0() + Duration::seconds(1800));
        assert_eq!(snap.mode, TimerMode::Completed);
        assert_eq!(snap.remaining_ms, 0);
        assert!(!snap.is_running);
        assert!(snap.target_end_time.is_none());
    }

    #[test]
    fn last_half_second_already_belongs_to_next_phase() {
        let snap = compute_phase(t0(), 1500, 300, t0() + Duration::milliseconds(1_499_600));
        assert_eq!(snap.mode, TimerMode::Break);
        assert_eq!(snap.remaining_secs(), 300);
        assert!(snap.is_running);

        let snap = compute_phase(t0(), 1500, 300, t0() + Duration::milliseconds(1_499_500));
        assert_eq!(snap.mode, TimerMode::Work);
        assert_eq!(snap.remaining_secs(), 1);

        let snap = compute_phase(t0(), 1500, 300, t0() + Duration::milliseconds(1_799_501));
        assert_eq!(snap.mode, TimerMode::Completed);
    }

    #[test]
    fn zero_break_completes_at_work_end() {
        let snap = compute_phase(t0(), 600, 0, t0() + Duration::seconds(600));
        assert_eq!(snap.mode, TimerMode::Completed);
    }

    #[test]
    fn clock_before_anchor_counts_as_start() {
        let snap = compute_phase(t0(), 600, 60, t0() - Duration::seconds(30));
        assert_eq!(snap.mode, TimerMode::Work);
        assert_eq!(snap.remaining_secs(), 600);
    }

    #[test]
    fn remaining_rounds_half_up() {
        assert_eq!(ms_to_secs(1499), 1);
        assert_eq!(ms_to_secs(1500), 2);
        assert_eq!(ms_to_secs(-20), 0);
    }

    proptest! {
        #[test]
        fn remaining_is_never_negative(
            work_min in 1i64..=720,
            break_min in 0i64..=720,
            elapsed in -10_000i64..200_000,
        ) {
            let snap = compute_phase(t0(), work_min * 60, break_min * 60, t0() + Duration::seconds(elapsed));
            prop_assert!(snap.remaining_ms >= 0);
            prop_assert_ne!(snap.mode, TimerMode::Idle);
        }

        #[test]
        fn past_the_span_is_completed(
            work_min in 1i64..=720,
            break_min in 0i64..=720,
            overshoot in 0i64..100_000,
        ) {
            let elapsed = work_min * 60 + break_min * 60 + overshoot;
            let snap = compute_phase(t0(), work_min * 60, break_min * 60, t0() + Duration::seconds(elapsed));
            prop_assert_eq!(snap.mode, TimerMode::Completed);
            prop_assert_eq!(snap.remaining_secs(), 0);
        }

        #[test]
        fn work_end_enters_break(work_min in 1i64..=720, break_min in 1i64..=720) {
            let snap = compute_phase(t0(), work_min * 60, break_min * 60, t0() + Duration::seconds(work_min * 60));
            prop_assert_eq!(snap.mode, TimerMode::Break);
            prop_assert_eq!(snap.remaining_secs(), (break_min * 60) as u64);
        }

        #[test]
        fn running_phase_never_shows_zero(
            work_min in 1i64..=180,
            break_min in 0i64..=60,
            elapsed_ms in 0i64..15_000_000,
        ) {
            let snap = compute_phase(t0(), work_min * 60, break_min * 60, t0() + Duration::milliseconds(elapsed_ms));
            prop_assert_eq!(snap.is_running, snap.remaining_secs() > 0);
            prop_assert_eq!(snap.is_running, snap.mode != TimerMode::Completed);
        }

        #[test]
        fn computation_is_idempotent(work_min in 1i64..=120, break_min in 0i64..=60, elapsed in 0i64..20_000) {
            let now = t0() + Duration::seconds(elapsed);
            let a = compute_phase(t0(), work_min * 60, break_min * 60, now);
            let b = compute_phase(t0(), work_min * 60, break_min * 60, now);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn running_phase_target_is_in_the_future(work_min in 1i64..=120, break_min in 0i64..=60, elapsed in 0i64..20_000) {
            let now = t0() + Duration::seconds(elapsed);
            let snap = compute_phase(t0(), work_min * 60, break_min * 60, now);
            if snap.is_running {
                prop_assert!(snap.target_end_time.unwrap() > now);
            }
        }
    }
}
