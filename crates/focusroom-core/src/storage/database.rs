//! SQLite-backed session store.
//!
//! Lets the engine run without a server: sessions and the XP profile live in
//! `~/.config/focusroom/focusroom.db`, with the same rules the remote store
//! enforces (one active session, XP credited on completion).

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{data_dir, migrations};
use crate::clock::Clock;
use crate::error::{CoreError, StoreError};
use crate::store::{level_for_xp, CompletionReceipt, Profile, SessionStore};
use crate::timer::{LinearReward, NewSession, RewardFormula, Session, SessionStatus};

const SESSION_COLUMNS: &str =
    "id, work_duration, break_duration, started_at, task_id, title, status";

pub struct LocalSessionStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    rewards: Arc<dyn RewardFormula>,
}

impl LocalSessionStore {
    /// Open the database at `~/.config/focusroom/focusroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open(clock: Arc<dyn Clock>) -> Result<Self, CoreError> {
        let path = data_dir()?.join("focusroom.db");
        Ok(Self::open_at(&path, clock)?)
    }

    pub fn open_at(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, clock)
    }

    /// Open an in-memory database.
    pub fn open_memory(clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            rewards: Arc::new(LinearReward::default()),
        })
    }

    /// Credit completions with `rewards` instead of the default rate.
    pub fn with_reward_formula(mut self, rewards: Arc<dyn RewardFormula>) -> Self {
        self.rewards = rewards;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session_by_id(conn: &Connection, id: &str) -> Result<Option<Session>, StoreError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], row_to_session).optional()?)
    }

    /// Mark an active session as ended with `status`. Runs on the caller's
    /// connection so it can share a transaction.
    fn finish(
        &self,
        conn: &Connection,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<Session, StoreError> {
        let session = Self::session_by_id(conn, session_id)?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        if session.status != SessionStatus::Active {
            return Err(StoreError::Conflict(format!(
                "session {session_id} is no longer active"
            )));
        }
        conn.execute(
            "UPDATE sessions SET status = ?1, ended_at = ?2 WHERE id = ?3",
            params![status_str(status), self.clock.now().to_rfc3339(), session_id],
        )?;
        Ok(session)
    }

    fn xp(conn: &Connection) -> Result<u64, StoreError> {
        let xp: i64 = conn.query_row("SELECT xp FROM profile WHERE id = 1", [], |row| row.get(0))?;
        Ok(u64::try_from(xp).unwrap_or(0))
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
        SessionStatus::Abandoned => "abandoned",
    }
}

fn parse_status(raw: &str) -> SessionStatus {
    match raw {
        "completed" => SessionStatus::Completed,
        "abandoned" => SessionStatus::Abandoned,
        _ => SessionStatus::Active,
    }
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let started_at: String = row.get(3)?;
    let started_at = DateTime::parse_from_rfc3339(&started_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let status: String = row.get(6)?;
    Ok(Session {
        id: row.get(0)?,
        work_duration: row.get(1)?,
        break_duration: row.get(2)?,
        started_at,
        task_id: row.get(4)?,
        title: row.get(5)?,
        status: parse_status(&status),
    })
}

#[async_trait]
impl SessionStore for LocalSessionStore {
    async fn create_session(&self, request: &NewSession) -> Result<Session, StoreError> {
        request
            .validate()
            .map_err(|e| StoreError::Validation(e.to_string()))?;

        let conn = self.conn();
        let active: Option<String> = conn
            .query_row(
                "SELECT id FROM sessions WHERE status = 'active' LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = active {
            return Err(StoreError::Conflict(format!("session {id} is already active")));
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
        conn.execute(
            "INSERT INTO sessions (id, work_duration, break_duration, started_at, task_id, title, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active')",
            params![
                session.id,
                session.work_duration,
                session.break_duration,
                session.started_at.to_rfc3339(),
                session.task_id,
                session.title,
            ],
        )?;
        Ok(session)
    }

    async fn list_active_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE status = 'active'
             ORDER BY started_at DESC
             LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], row_to_session)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn complete_session(&self, session_id: &str) -> Result<CompletionReceipt, StoreError> {
        let conn = self.conn();
        // Status and XP change together or not at all.
        let tx = conn.unchecked_transaction()?;
        let session = self.finish(&tx, session_id, SessionStatus::Completed)?;
        let before = Self::xp(&tx)?;
        let after = before.saturating_add(self.rewards.xp_for(session.work_duration));
        tx.execute(
            "UPDATE profile SET xp = ?1 WHERE id = 1",
            params![i64::try_from(after).unwrap_or(i64::MAX)],
        )?;
        tx.commit()?;

        let (old_level, new_level) = (level_for_xp(before), level_for_xp(after));
        Ok(CompletionReceipt {
            new_level: (new_level > old_level).then_some(new_level),
        })
    }

    async fn abandon_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.finish(&self.conn(), session_id, SessionStatus::Abandoned)?;
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<Profile, StoreError> {
        let xp = Self::xp(&self.conn())?;
        Ok(Profile {
            xp,
            level: level_for_xp(xp),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (LocalSessionStore, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let store = LocalSessionStore::open_memory(Arc::new(clock.clone())).unwrap();
        (store, clock)
    }

    #[tokio::test]
    async fn create_then_list_active() {
        let (store, _) = store();
        let created = store
            .create_session(&NewSession::new(25, 5).with_title("Write report"))
            .await
            .unwrap();
        let active = store.list_active_sessions(5).await.unwrap();
        assert_eq!(active, vec![created]);
    }

    #[tokio::test]
    async fn second_active_session_conflicts() {
        let (store, _) = store();
        store.create_session(&NewSession::new(25, 5)).await.unwrap();
        let err = store
            .create_session(&NewSession::new(50, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn completion_credits_xp_once() {
        let (store, clock) = store();
        let session = store.create_session(&NewSession::new(50, 10)).await.unwrap();
        clock.advance_secs(3600);
        assert_eq!(
            store.complete_session(&session.id).await.unwrap(),
            CompletionReceipt { new_level: None }
        );
        assert!(store.complete_session(&session.id).await.is_err());
        assert_eq!(store.fetch_profile().await.unwrap(), Profile { xp: 500, level: 1 });
        assert!(store.list_active_sessions(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn crossing_a_level_is_reported() {
        let (store, _) = store();
        let first = store.create_session(&NewSession::new(50, 0)).await.unwrap();
        assert_eq!(store.complete_session(&first.id).await.unwrap().new_level, None);
        let second = store.create_session(&NewSession::new(50, 0)).await.unwrap();
        assert_eq!(
            store.complete_session(&second.id).await.unwrap().new_level,
            Some(2)
        );
    }

    #[tokio::test]
    async fn failed_xp_credit_leaves_session_active() {
        let (store, _) = store();
        let session = store.create_session(&NewSession::new(25, 5)).await.unwrap();
        store
            .conn()
            .execute_batch(
                "CREATE TRIGGER profile_locked BEFORE UPDATE ON profile
                 BEGIN SELECT RAISE(ABORT, 'profile locked'); END;",
            )
            .unwrap();

        let err = store.complete_session(&session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(msg) if msg.contains("profile locked")));
        assert_eq!(store.list_active_sessions(1).await.unwrap(), vec![session.clone()]);
        assert_eq!(store.fetch_profile().await.unwrap().xp, 0);

        // Once the profile is writable again the retry credits the reward.
        store.conn().execute_batch("DROP TRIGGER profile_locked").unwrap();
        store.complete_session(&session.id).await.unwrap();
        assert_eq!(store.fetch_profile().await.unwrap().xp, 250);
        assert!(store.list_active_sessions(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completion_uses_configured_reward_rate() {
        let (store, _) = store();
        let store = store.with_reward_formula(Arc::new(LinearReward { xp_per_minute: 12 }));
        let session = store.create_session(&NewSession::new(25, 5)).await.unwrap();
        store.complete_session(&session.id).await.unwrap();
        assert_eq!(store.fetch_profile().await.unwrap(), Profile { xp: 300, level: 1 });
    }

    #[tokio::test]
    async fn abandon_unknown_session_is_not_found() {
        let (store, _) = store();
        assert_eq!(
            store.abandon_session("missing").await,
            Err(StoreError::NotFound("missing".into()))
        );
    }

    #[tokio::test]
    async fn sessions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focusroom.db");
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let created = {
            let store = LocalSessionStore::open_at(&path, clock.clone()).unwrap();
            store.create_session(&NewSession::new(25, 5)).await.unwrap()
        };
        let reopened = LocalSessionStore::open_at(&path, clock).unwrap();
        let active = reopened.list_active_sessions(1).await.unwrap();
        assert_eq!(active.first().map(|s| s.id.as_str()), Some(created.id.as_str()));
    }
}
