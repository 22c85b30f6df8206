use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Trainer onboarding state. `Verified` is terminal; `Rejected` can cycle
/// back to `Pending` once the re-registration cooldown has elapsed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(VerificationStatus::Pending),
            "verified" => Some(VerificationStatus::Verified),
            "rejected" => Some(VerificationStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrainerProfile {
    pub user_id: Uuid,
    pub bio: Option<String>,
    pub specialty: Option<String>,
    pub hourly_rate_cents: i64,
    pub available: bool,
    pub verification_status: String,
    pub rejection_date: Option<DateTime<Utc>>,
    pub rating_average: f64,
    pub total_bookings: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainerProfile {
    pub fn status(&self) -> VerificationStatus {
        VerificationStatus::from_str(&self.verification_status)
            .unwrap_or(VerificationStatus::Pending)
    }
}

/// Trainer-supplied application data, part of trainer registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainerApplication {
    pub bio: Option<String>,
    pub specialty: Option<String>,
    pub hourly_rate_cents: Option<i64>,
}

/// Public listing entry. Only verified trainers are ever exposed here.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrainerPublic {
    pub id: Uuid,
    pub full_name: String,
    pub bio: Option<String>,
    pub specialty: Option<String>,
    pub hourly_rate_cents: i64,
    pub rating_average: f64,
    pub total_bookings: i32,
}
