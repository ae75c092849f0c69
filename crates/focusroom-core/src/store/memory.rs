//! In-process session store.
//!
//! Behaves like the remote store (one active session, XP crediting, level
//! reports) and can be told to fail specific operations, which is how the
//! engine's network-failure paths are exercised.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{level_for_xp, CompletionReceipt, Profile, SessionStore};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::timer::{LinearReward, NewSession, RewardFormula, Session, SessionStatus};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    ListActive,
    Complete,
    Abandon,
    FetchProfile,
}

#[derive(Default)]
struct Inner {
    sessions: Vec<Session>,
    xp: u64,
    failures: HashMap<StoreOp, VecDeque<StoreError>>,
    calls: HashMap<StoreOp, usize>,
}

pub struct MemorySessionStore {
    clock: Arc<dyn Clock>,
    rewards: Arc<dyn RewardFormula>,
    inner: Mutex<Inner>,
}

impl MemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rewards: Arc::new(LinearReward::default()),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_reward_formula(mut self, rewards: Arc<dyn RewardFormula>) -> Self {
        self.rewards = rewards;
        self
    }

    /// Seed a session, e.g. one left active by a previous process.
    pub fn insert(&self, session: Session) {
        self.lock().sessions.push(session);
    }

    /// Make the next call of `op` fail with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// How many times `op` has been invoked, failed calls included.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.lock().sessions.iter().find(|s| s.id == id).cloned()
    }

    pub fn profile(&self) -> Profile {
        let xp = self.lock().xp;
        Profile {
            xp,
            level: level_for_xp(xp),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, op: StoreOp) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut inner = self.lock();
        *inner.calls.entry(op).or_default() += 1;
        if let Some(err) = inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(inner)
    }
}

fn active_mut<'a>(inner: &'a mut Inner, session_id: &str) -> Result<&'a mut Session, StoreError> {
    let session = inner
        .sessions
        .iter_mut()
        .find(|s| s.id == session_id)
        .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
    if session.status != SessionStatus::Active {
        return Err(StoreError::Conflict(format!(
            "session {session_id} is no longer active"
        )));
    }
    Ok(session)
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, request: &NewSession) -> Result<Session, StoreError> {
        let mut inner = self.begin(StoreOp::Create)?;
        request
            .validate()
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        if let Some(active) = inner
            .sessions
            .iter()
            .find(|s| s.status == SessionStatus::Active)
        {
            return Err(StoreError::Conflict(format!(
                "session {} is already active",
                active.id
            )));
        }
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            work_duration: request.work_duration,
            break_duration: request.break_duration,
            started_at: self.clock.now(),
            task_id: request.task_id.clone(),
            title: request.title.clone(),
            status: SessionStatus::Active,
        };
        inner.sessions.push(session.clone());
        Ok(session)
    }

    async fn list_active_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let inner = self.begin(StoreOp::ListActive)?;
        let mut active: Vec<Session> = inner
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        active.truncate(limit);
        Ok(active)
    }

    async fn complete_session(&self, session_id: &str) -> Result<CompletionReceipt, StoreError> {
        let mut inner = self.begin(StoreOp::Complete)?;
        let session = active_mut(&mut inner, session_id)?;
        session.status = SessionStatus::Completed;
        let earned = self.rewards.xp_for(session.work_duration);

        let before = level_for_xp(inner.xp);
        inner.xp += earned;
        let after = level_for_xp(inner.xp);
        Ok(CompletionReceipt {
            new_level: (after > before).then_some(after),
        })
    }

    async fn abandon_session(&self, session_id: &str) -> Result<(), StoreError> {
        let mut inner = self.begin(StoreOp::Abandon)?;
        active_mut(&mut inner, session_id)?.status = SessionStatus::Abandoned;
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<Profile, StoreError> {
        let inner = self.begin(StoreOp::FetchProfile)?;
        Ok(Profile {
            xp: inner.xp,
            level: level_for_xp(inner.xp),
        })
    }
}
