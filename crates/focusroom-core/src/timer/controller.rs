//! Session lifecycle controller.
//!
//! A wall-clock-based state machine over one focus session. It runs no
//! threads of its own: the caller drives recomputation by calling `tick()`
//! (typically once a second), `on_visibility_change()` and the user actions.
//! Every trigger goes through the phase calculator, so a missed or late tick
//! never skews the remaining time.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Work -> Break -> Completed -> Idle
//!          |        |          ^
//!          +--------+----------+   (complete / abandon return to Idle)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut controller = SessionController::new(store, Arc::new(SystemClock));
//! controller.recover().await?;
//! controller.start(NewSession::new(25, 5), false).await?;
//! // In a loop:
//! controller.tick(); // Returns Some(Event) on a phase change
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::phase::{compute_phase, ms_to_secs, PhaseSnapshot};
use super::reward::{spawn_commit, CompletionHandle, LinearReward, Reward, RewardFormula};
use super::session::{NewSession, Session, TimerMode};
use super::visibility::Visibility;
use crate::clock::Clock;
use crate::error::{CoreError, Result, StateError};
use crate::events::{Event, EventSink};
use crate::store::SessionStore;

/// Read-only view of the timer handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub session: Option<Session>,
    pub mode: TimerMode,
    /// Seconds left in the current phase as of the last recomputation.
    pub time_remaining: u64,
    pub is_running: bool,
    pub error: Option<String>,
}

impl TimerState {
    fn idle() -> Self {
        Self {
            session: None,
            mode: TimerMode::Idle,
            time_remaining: 0,
            is_running: false,
            error: None,
        }
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Where a paused session stopped.
#[derive(Debug, Clone, Copy)]
struct PausePoint {
    at: DateTime<Utc>,
    remaining_ms: i64,
}

/// Owns the state of one focus session and the operations that change it.
pub struct SessionController {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    rewards: Arc<dyn RewardFormula>,
    events: EventSink,
    pub(super) recovery_limit: usize,
    pub(super) state: TimerState,
    /// Instant the phases are measured from. Starts at the session start and
    /// moves forward by every paused interval and skipped work time.
    anchor: Option<DateTime<Utc>>,
    /// Expiry of the running phase; the timing authority while running.
    target_end_time: Option<DateTime<Utc>>,
    paused: Option<PausePoint>,
    pub(super) visibility: Visibility,
}

impl SessionController {
    /// Create an idle controller.
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            rewards: Arc::new(LinearReward::default()),
            events: EventSink::disconnected(),
            recovery_limit: 1,
            state: TimerState::idle(),
            anchor: None,
            target_end_time: None,
            paused: None,
            visibility: Visibility::Foreground,
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_reward_formula(mut self, rewards: Arc<dyn RewardFormula>) -> Self {
        self.rewards = rewards;
        self
    }

    /// How many active sessions `recover()` asks the store for.
    pub fn with_recovery_limit(mut self, limit: usize) -> Self {
        self.recovery_limit = limit.max(1);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn mode(&self) -> TimerMode {
        self.state.mode
    }

    pub fn session(&self) -> Option<&Session> {
        self.state.session.as_ref()
    }

    pub fn target_end_time(&self) -> Option<DateTime<Utc>> {
        self.target_end_time
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            session_id: self.state.session.as_ref().map(|s| s.id.clone()),
            mode: self.state.mode,
            time_remaining: self.state.time_remaining,
            is_running: self.state.is_running,
            error: self.state.error.clone(),
            at: self.clock.now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Create a session in the store and start its work phase.
    ///
    /// With `replace_existing`, a session already held locally is abandoned
    /// in the store first; otherwise starting over it is rejected.
    pub async fn start(&mut self, request: NewSession, replace_existing: bool) -> Result<Event> {
        if let Err(e) = request.validate() {
            return Err(self.fail("start", e.into()));
        }

        if let Some(current) = self.state.session.clone() {
            if !replace_existing {
                return Err(self.fail("start", StateError::SessionActive(current.id).into()));
            }
            tracing::info!(session_id = %current.id, "abandoning session to start a new one");
            if let Err(e) = self.store.abandon_session(&current.id).await {
                return Err(self.fail("start", e.into()));
            }
            self.clear();
        }

        let session = match self.store.create_session(&request).await {
            Ok(session) => session,
            Err(e) => return Err(self.fail("start", e.into())),
        };

        let now = self.clock.now();
        tracing::info!(
            session_id = %session.id,
            work = session.work_duration,
            brk = session.break_duration,
            "session started"
        );
        let event = Event::SessionStarted {
            session_id: session.id.clone(),
            work_duration: session.work_duration,
            break_duration: session.break_duration,
            at: now,
        };
        self.install(session, now, now);
        Ok(self.emit(event))
    }

    pub fn pause(&mut self) -> Option<Event> {
        if !self.state.is_running {
            return None;
        }
        let now = self.clock.now();
        // Settle any expiry that happened since the last tick first.
        let phase = self.recompute(now);
        if !self.state.is_running {
            return phase;
        }

        let snap = self.phase_at(now)?;
        self.paused = Some(PausePoint {
            at: now,
            remaining_ms: snap.remaining_ms,
        });
        self.target_end_time = None;
        self.state.is_running = false;
        self.state.time_remaining = snap.remaining_secs();
        self.state.error = None;
        tracing::debug!(remaining = self.state.time_remaining, "paused");

        Some(self.emit(Event::SessionPaused {
            session_id: self.session_id()?,
            remaining_secs: self.state.time_remaining,
            at: now,
        }))
    }

    pub fn resume(&mut self) -> Option<Event> {
        if self.state.is_running || !matches!(self.state.mode, TimerMode::Work | TimerMode::Break) {
            return None;
        }
        let pause = self.paused.take()?;
        let now = self.clock.now();

        // Shift the anchor by the paused interval so it never counts.
        if let Some(anchor) = self.anchor.as_mut() {
            *anchor += now - pause.at;
        }
        self.target_end_time = Some(now + Duration::milliseconds(pause.remaining_ms));
        self.state.is_running = true;
        self.state.time_remaining = ms_to_secs(pause.remaining_ms);
        self.state.error = None;
        tracing::debug!(remaining = self.state.time_remaining, "resumed");

        Some(self.emit(Event::SessionResumed {
            session_id: self.session_id()?,
            remaining_secs: self.state.time_remaining,
            at: now,
        }))
    }

    /// Recompute against the clock. Returns `Some(Event::PhaseChanged)` when
    /// the running phase expired since the last recomputation.
    pub fn tick(&mut self) -> Option<Event> {
        let now = self.clock.now();
        self.recompute(now)
    }

    /// End the work phase now and start the full break.
    pub fn skip_to_break(&mut self) -> Option<Event> {
        if self.state.mode != TimerMode::Work {
            return None;
        }
        let now = self.clock.now();
        let work = Duration::seconds(self.session()?.work_secs());
        self.anchor = Some(now - work);
        self.paused = None;
        self.state.is_running = true;
        self.state.error = None;
        tracing::info!("work phase skipped");
        self.apply(now)
    }

    /// End the break now; the session becomes completed.
    pub fn skip_break(&mut self) -> Option<Event> {
        if self.state.mode != TimerMode::Break {
            return None;
        }
        let now = self.clock.now();
        self.paused = None;
        self.state.error = None;
        tracing::info!("break skipped");
        self.set_phase(now, completed_phase())
    }

    /// Finish the session.
    ///
    /// Local state is idle when this returns, whatever happens remotely. The
    /// expected reward is published immediately; the store is told in the
    /// background and its answer only produces events. Needs a Tokio runtime
    /// to run the background commit.
    pub fn complete(&mut self) -> Result<CompletionHandle> {
        let session = match self.state.session.clone() {
            Some(session) => session,
            None => return Err(StateError::NoSession.into()),
        };
        self.clear();

        let reward = Reward {
            session_id: session.id.clone(),
            xp: self.rewards.xp_for(session.work_duration),
        };
        tracing::info!(session_id = %session.id, xp = reward.xp, "session completed");
        self.emit(Event::RewardGranted {
            session_id: reward.session_id.clone(),
            xp: reward.xp,
            at: self.clock.now(),
        });

        let commit = spawn_commit(
            self.store.clone(),
            self.clock.clone(),
            self.events.clone(),
            session.id,
        );
        Ok(CompletionHandle { reward, commit })
    }

    /// Abandon the session. Local state changes only once the store confirms.
    pub async fn abandon(&mut self) -> Result<Event> {
        let session_id = match self.session_id() {
            Some(id) => id,
            None => return Err(StateError::NoSession.into()),
        };

        if let Err(e) = self.store.abandon_session(&session_id).await {
            return Err(self.fail("abandon", e.into()));
        }

        tracing::info!(%session_id, "session abandoned");
        self.clear();
        let at = self.clock.now();
        Ok(self.emit(Event::SessionAbandoned { session_id, at }))
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Apply the phase calculator if running. No-op when idle or paused.
    fn recompute(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if !self.state.is_running {
            return None;
        }
        self.apply(now)
    }

    fn apply(&mut self, now: DateTime<Utc>) -> Option<Event> {
        let snap = self.phase_at(now)?;
        self.set_phase(now, snap)
    }

    fn phase_at(&self, now: DateTime<Utc>) -> Option<PhaseSnapshot> {
        let session = self.state.session.as_ref()?;
        let anchor = self.anchor?;
        Some(compute_phase(
            anchor,
            session.work_secs(),
            session.break_secs(),
            now,
        ))
    }

    /// Install a computed phase, emitting `PhaseChanged` if the mode moved.
    fn set_phase(&mut self, now: DateTime<Utc>, snap: PhaseSnapshot) -> Option<Event> {
        let from = self.state.mode;
        self.state.mode = snap.mode;
        self.state.time_remaining = snap.remaining_secs();
        self.state.is_running = snap.is_running;
        self.target_end_time = snap.target_end_time.filter(|_| snap.is_running);
        tracing::debug!(
            mode = snap.mode.as_str(),
            remaining = self.state.time_remaining,
            "recomputed"
        );

        if from == snap.mode {
            return None;
        }
        tracing::info!(from = from.as_str(), to = snap.mode.as_str(), "phase changed");
        let session_id = self.session_id()?;
        Some(self.emit(Event::PhaseChanged {
            session_id,
            from,
            to: snap.mode,
            remaining_secs: self.state.time_remaining,
            at: now,
        }))
    }

    /// Mirror `session` locally with phases measured from `anchor`.
    pub(super) fn install(&mut self, session: Session, anchor: DateTime<Utc>, now: DateTime<Utc>) {
        let snap = compute_phase(anchor, session.work_secs(), session.break_secs(), now);
        self.state = TimerState {
            session: Some(session),
            mode: snap.mode,
            time_remaining: snap.remaining_secs(),
            is_running: snap.is_running,
            error: None,
        };
        self.anchor = Some(anchor);
        self.target_end_time = snap.target_end_time.filter(|_| snap.is_running);
        self.paused = None;
    }

    fn clear(&mut self) {
        self.state = TimerState::idle();
        self.anchor = None;
        self.target_end_time = None;
        self.paused = None;
    }

    /// Record a failed action in the state and the event stream.
    pub(super) fn fail(&mut self, action: &str, err: CoreError) -> CoreError {
        tracing::warn!(action, "action failed: {err}");
        let message = err.to_string();
        self.state.error = Some(message.clone());
        self.emit(Event::ActionFailed {
            action: action.to_string(),
            message,
            at: self.clock.now(),
        });
        err
    }

    pub(super) fn emit(&self, event: Event) -> Event {
        self.events.publish(event.clone());
        event
    }

    pub(super) fn session_id(&self) -> Option<String> {
        self.state.session.as_ref().map(|s| s.id.clone())
    }

    pub(super) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(super) fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}

fn completed_phase() -> PhaseSnapshot {
    PhaseSnapshot {
        mode: TimerMode::Completed,
        remaining_ms: 0,
        is_running: false,
        target_end_time: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{StoreError, ValidationError};
    use crate::store::{MemorySessionStore, StoreOp};

    fn setup() -> (SessionController, Arc<MemorySessionStore>, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(MemorySessionStore::new(Arc::new(clock.clone())));
        let controller = SessionController::new(store.clone(), Arc::new(clock.clone()));
        (controller, store, clock)
    }

    #[tokio::test]
    async fn start_enters_work() {
        let (mut c, _, clock) = setup();
        c.start(NewSession::new(25, 5), false).await.unwrap();
        assert_eq!(c.mode(), TimerMode::Work);
        assert_eq!(c.state().time_remaining, 1500);
        assert!(c.state().is_running);
        assert_eq!(c.target_end_time(), Some(clock.now() + Duration::seconds(1500)));
    }

    #[tokio::test]
    async fn invalid_duration_never_reaches_store() {
        let (mut c, store, _) = setup();
        let err = c.start(NewSession::new(0, 5), false).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::WorkDurationTooShort(0))
        ));
        assert_eq!(store.calls(StoreOp::Create), 0);
        assert_eq!(c.mode(), TimerMode::Idle);
        assert!(c.state().error.is_some());
    }

    #[tokio::test]
    async fn failed_create_stays_idle_with_error() {
        let (mut c, store, _) = setup();
        store.fail_next(StoreOp::Create, StoreError::Network("offline".into()));
        let err = c.start(NewSession::new(25, 5), false).await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(c.mode(), TimerMode::Idle);
        assert!(c.session().is_none());
        assert!(c.state().error.as_deref().unwrap().contains("offline"));

        // Retry works straight away and clears the error.
        c.start(NewSession::new(25, 5), false).await.unwrap();
        assert_eq!(c.mode(), TimerMode::Work);
        assert!(c.state().error.is_none());
    }

    #[tokio::test]
    async fn start_over_active_session_needs_replace() {
        let (mut c, store, _) = setup();
        c.start(NewSession::new(25, 5), false).await.unwrap();
        let first = c.session().unwrap().id.clone();

        let err = c.start(NewSession::new(50, 10), false).await.unwrap_err();
        assert!(matches!(err, CoreError::State(StateError::SessionActive(_))));
        assert_eq!(c.session().unwrap().id, first);

        c.start(NewSession::new(50, 10), true).await.unwrap();
        assert_ne!(c.session().unwrap().id, first);
        assert_eq!(c.state().time_remaining, 3000);
        assert_eq!(store.calls(StoreOp::Abandon), 1);
    }

    #[tokio::test]
    async fn pause_freezes_and_resume_shifts_target() {
        let (mut c, _, clock) = setup();
        c.start(NewSession::new(25, 5), false).await.unwrap();
        clock.advance_secs(600);
        assert!(c.pause().is_some());
        assert_eq!(c.state().time_remaining, 900);
        assert!(c.target_end_time().is_none());
        assert!(!c.state().is_running);

        clock.advance_secs(7200);
        assert!(c.tick().is_none());
        assert_eq!(c.state().time_remaining, 900);

        assert!(c.resume().is_some());
        assert_eq!(c.target_end_time(), Some(clock.now() + Duration::seconds(900)));

        clock.advance_secs(900);
        assert!(matches!(
            c.tick(),
            Some(Event::PhaseChanged { to: TimerMode::Break, .. })
        ));
        assert_eq!(c.state().time_remaining, 300);
    }

    #[tokio::test]
    async fn running_state_never_shows_zero_seconds() {
        let (mut c, _, clock) = setup();
        c.start(NewSession::new(25, 5), false).await.unwrap();
        clock.advance(Duration::milliseconds(1_499_600));
        assert!(matches!(
            c.tick(),
            Some(Event::PhaseChanged { to: TimerMode::Break, .. })
        ));
        assert!(c.state().is_running);
        assert_eq!(c.state().time_remaining, 300);

        // Pausing in the same window freezes the break, not an empty work phase.
        let (mut c, _, clock) = setup();
        c.start(NewSession::new(25, 5), false).await.unwrap();
        clock.advance(Duration::milliseconds(1_499_600));
        c.pause();
        assert_eq!(c.mode(), TimerMode::Break);
        assert!(!c.state().is_running);
        assert_eq!(c.state().time_remaining, 300);
    }

    #[tokio::test]
    async fn snapshot_mirrors_state() {
        let (mut c, _, clock) = setup();
        c.start(NewSession::new(25, 5), false).await.unwrap();
        clock.advance_secs(90);
        c.tick();
        let id = c.session().unwrap().id.clone();
        assert_eq!(
            c.snapshot(),
            Event::StateSnapshot {
                session_id: Some(id),
                mode: TimerMode::Work,
                time_remaining: 1410,
                is_running: true,
                error: None,
                at: clock.now(),
            }
        );
    }

    #[tokio::test]
    async fn invalid_state_actions_are_noops() {
        let (mut c, _, _) = setup();
        assert!(c.pause().is_none());
        assert!(c.resume().is_none());
        assert!(c.skip_to_break().is_none());
        assert!(c.skip_break().is_none());
        assert!(c.tick().is_none());
        assert_eq!(c.state(), &TimerState::idle());

        c.start(NewSession::new(25, 5), false).await.unwrap();
        assert!(c.resume().is_none());
        assert!(c.skip_break().is_none());
    }

    #[tokio::test]
    async fn zero_break_goes_straight_to_completed() {
        let (mut c, _, clock) = setup();
        c.start(NewSession::new(10, 0), false).await.unwrap();
        clock.advance_secs(600);
        assert!(matches!(
            c.tick(),
            Some(Event::PhaseChanged { to: TimerMode::Completed, .. })
        ));
        assert!(!c.state().is_running);

        let (mut c, _, _) = setup();
        c.start(NewSession::new(10, 0), false).await.unwrap();
        c.skip_to_break();
        assert_eq!(c.mode(), TimerMode::Completed);
    }

    #[tokio::test]
    async fn skip_break_completes() {
        let (mut c, _, clock) = setup();
        c.start(NewSession::new(25, 5), false).await.unwrap();
        clock.advance_secs(1560);
        c.tick();
        assert_eq!(c.mode(), TimerMode::Break);
        assert!(c.skip_break().is_some());
        assert_eq!(c.mode(), TimerMode::Completed);
        assert_eq!(c.state().time_remaining, 0);
        assert!(c.target_end_time().is_none());
        assert!(c.session().is_some());
    }

    #[tokio::test]
    async fn complete_without_session_is_state_error() {
        let (mut c, _, _) = setup();
        assert!(matches!(
            c.complete(),
            Err(CoreError::State(StateError::NoSession))
        ));
    }

    #[tokio::test]
    async fn abandon_without_session_is_state_error() {
        let (mut c, store, _) = setup();
        assert!(matches!(
            c.abandon().await,
            Err(CoreError::State(StateError::NoSession))
        ));
        assert_eq!(store.calls(StoreOp::Abandon), 0);
    }
}
