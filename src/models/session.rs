use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lesson lifecycle: scheduled -> active -> completed. Only `completed`
/// unlocks review eligibility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Scheduled,
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Some(SessionStatus::Scheduled),
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }

    pub fn can_transition_to(self, target: SessionStatus) -> bool {
        matches!(
            (self, target),
            (SessionStatus::Scheduled, SessionStatus::Active)
                | (SessionStatus::Active, SessionStatus::Completed)
        )
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub trainer_id: Uuid,
    pub scheduled_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: String,
    pub meeting_link: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_str(&self.status).unwrap_or(SessionStatus::Scheduled)
    }
}

/// A session together with the student ids materialized at creation time.
#[derive(Debug, Clone, Serialize)]
pub struct SessionWithStudents {
    #[serde(flatten)]
    pub session: Session,
    pub student_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSession {
    pub title: String,
    pub booking_ids: Vec<Uuid>,
    pub scheduled_date: DateTime<Utc>,
    pub duration_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct TransitionSession {
    pub status: SessionStatus,
}
