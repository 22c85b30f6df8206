use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment lifecycle of a booking. `Completed` and `Failed` are terminal;
/// once terminal a booking never changes payment state again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }

    /// The only legal transitions are pending -> completed and
    /// pending -> failed.
    pub fn can_transition_to(self, target: PaymentStatus) -> bool {
        matches!(
            (self, target),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Gateway,
    #[cfg(feature = "demo-payments")]
    Demo,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Gateway => "gateway",
            #[cfg(feature = "demo-payments")]
            PaymentMethod::Demo => "demo",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method: String,
    pub payment_id: Option<String>,
    pub payment_status: String,
    pub session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.payment_status).unwrap_or(PaymentStatus::Pending)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBooking {
    pub trainer_id: Uuid,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub payment_method: PaymentMethod,
    /// Payment intent id, when the intent was created before the booking.
    /// Webhook reconciliation matches on this.
    pub payment_id: Option<String>,
}

/// Body for `PUT /api/bookings/:id/payment`, the client-confirmation path.
#[derive(Debug, Deserialize)]
pub struct UpdateBookingPayment {
    pub status: PaymentStatus,
    pub payment_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_transitions() {
        use PaymentStatus::*;

        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));

        // Terminal states never move again, in any direction.
        for terminal in [Completed, Failed] {
            for target in [Pending, Completed, Failed] {
                assert!(!terminal.can_transition_to(target));
            }
        }
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_payment_status_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
        ] {
            assert_eq!(PaymentStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::from_str("refunded"), None);
    }
}
