use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Longest accepted phase, in minutes.
pub const MAX_PHASE_MIN: u32 = 12 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    Idle,
    Work,
    Break,
    Completed,
}

impl TimerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Idle => "idle",
            TimerMode::Work => "work",
            TimerMode::Break => "break",
            TimerMode::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

/// A focus session as recorded by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    /// Work phase length in minutes.
    pub work_duration: u32,
    /// Break phase length in minutes. Zero means no break.
    pub break_duration: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default = "default_status")]
    pub status: SessionStatus,
}

fn default_status() -> SessionStatus {
    SessionStatus::Active
}

impl Session {
    /// Work phase length in seconds.
    ///
    /// Uses saturating arithmetic to prevent overflow with large values.
    pub fn work_secs(&self) -> i64 {
        i64::from(self.work_duration).saturating_mul(60)
    }

    /// Break phase length in seconds.
    pub fn break_secs(&self) -> i64 {
        i64::from(self.break_duration).saturating_mul(60)
    }
}

/// Parameters for creating a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub work_duration: u32,
    pub break_duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl NewSession {
    pub fn new(work_duration: u32, break_duration: u32) -> Self {
        Self {
            work_duration,
            break_duration,
            task_id: None,
            title: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Reject durations the engine cannot run.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.work_duration == 0 {
            return Err(ValidationError::WorkDurationTooShort(self.work_duration));
        }
        if self.work_duration > MAX_PHASE_MIN {
            return Err(ValidationError::DurationTooLong {
                field: "work",
                minutes: self.work_duration,
                max: MAX_PHASE_MIN,
            });
        }
        if self.break_duration > MAX_PHASE_MIN {
            return Err(ValidationError::DurationTooLong {
                field: "break",
                minutes: self.break_duration,
                max: MAX_PHASE_MIN,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_work_is_rejected() {
        assert_eq!(
            NewSession::new(0, 5).validate(),
            Err(ValidationError::WorkDurationTooShort(0))
        );
    }

    #[test]
    fn zero_break_is_allowed() {
        assert!(NewSession::new(25, 0).validate().is_ok());
    }

    #[test]
    fn overlong_break_is_rejected() {
        let err = NewSession::new(25, MAX_PHASE_MIN + 1).validate().unwrap_err();
        assert!(matches!(err, ValidationError::DurationTooLong { field: "break", .. }));
    }

    #[test]
    fn session_wire_format_is_camel_case() {
        let json = r#"{
            "id": "s-1",
            "workDuration": 25,
            "breakDuration": 5,
            "startedAt": "2026-01-05T09:00:00Z",
            "taskId": "t-9"
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.work_secs(), 1500);
        assert_eq!(session.break_secs(), 300);
        assert_eq!(session.task_id.as_deref(), Some("t-9"));
        assert_eq!(session.status, SessionStatus::Active);
    }
}
