use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{TrainerApplication, TrainerProfile, User, VerificationStatus};
use crate::services::email_service::EmailService;

const PROFILE_COLUMNS: &str = "user_id, bio, specialty, hourly_rate_cents, available, \
     verification_status, rejection_date, rating_average, total_bookings, created_at, updated_at";

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Re-registration cooldown has not elapsed; about {remaining_hours} hour(s) remaining")]
    CooldownNotElapsed { remaining_hours: i64 },
    #[error("Invalid or expired decision link")]
    InvalidOrExpiredToken,
    #[error("This application has already been resolved")]
    AlreadyResolved,
    #[error("An application is already pending for this trainer")]
    AlreadyPending,
    #[error("Trainer is already verified")]
    AlreadyVerified,
    #[error("A reason is required for manual verification changes")]
    ReasonRequired,
    #[error("Trainer not found")]
    TrainerNotFound,
    #[error("Failed to sign decision link")]
    TokenSigning,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for VerificationError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            VerificationError::CooldownNotElapsed { .. } => {
                (StatusCode::BAD_REQUEST, "Cooldown not elapsed")
            }
            VerificationError::InvalidOrExpiredToken => {
                (StatusCode::BAD_REQUEST, "Invalid or expired token")
            }
            VerificationError::AlreadyResolved => (StatusCode::CONFLICT, "Already resolved"),
            VerificationError::AlreadyPending => (StatusCode::CONFLICT, "Already pending"),
            VerificationError::AlreadyVerified => (StatusCode::CONFLICT, "Already verified"),
            VerificationError::ReasonRequired => (StatusCode::BAD_REQUEST, "Reason required"),
            VerificationError::TrainerNotFound => (StatusCode::NOT_FOUND, "Trainer not found"),
            VerificationError::TokenSigning | VerificationError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// The two actions a decision link can authorize.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Approve,
    Reject,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Approve => "approve",
            DecisionAction::Reject => "reject",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "approve" => Some(DecisionAction::Approve),
            "reject" => Some(DecisionAction::Reject),
            _ => None,
        }
    }
}

/// Claims embedded in a decision link. Possession of a valid token is the
/// authorization; the pending-status check is the sole replay guard.
#[derive(Debug, Serialize, Deserialize)]
struct DecisionClaims {
    sub: String,
    action: String,
    exp: usize,
    iat: usize,
    jti: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub trainer_id: Uuid,
    pub trainer_name: String,
    pub action: DecisionAction,
}

/// Time left before a rejected trainer may re-apply, or `None` once the
/// cooldown has elapsed.
pub fn cooldown_remaining(
    rejection_date: DateTime<Utc>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Option<Duration> {
    let elapsed = now - rejection_date;
    if elapsed >= cooldown {
        None
    } else {
        Some(cooldown - elapsed)
    }
}

fn sign_decision_token(
    key: &EncodingKey,
    trainer_id: Uuid,
    action: DecisionAction,
    ttl: Duration,
) -> Result<String, VerificationError> {
    let now = Utc::now();
    let claims = DecisionClaims {
        sub: trainer_id.to_string(),
        action: action.as_str().to_string(),
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
    };

    encode(&Header::default(), &claims, key).map_err(|_| VerificationError::TokenSigning)
}

fn decode_decision_token(
    key: &DecodingKey,
    token: &str,
) -> Result<(Uuid, DecisionAction), VerificationError> {
    let validation = Validation::new(Algorithm::HS256);

    let claims = decode::<DecisionClaims>(token, key, &validation)
        .map_err(|_| VerificationError::InvalidOrExpiredToken)?
        .claims;

    let trainer_id =
        Uuid::parse_str(&claims.sub).map_err(|_| VerificationError::InvalidOrExpiredToken)?;
    let action = DecisionAction::from_str(&claims.action)
        .ok_or(VerificationError::InvalidOrExpiredToken)?;

    Ok((trainer_id, action))
}

/// Owns the trainer onboarding state machine: application submission with
/// re-registration cooldown, signed one-click decision links, and the
/// audited admin override.
#[derive(Clone)]
pub struct VerificationService {
    db: PgPool,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    link_ttl: Duration,
    cooldown: Duration,
    mailer: EmailService,
    app_url: String,
}

impl VerificationService {
    pub fn new(
        db: PgPool,
        decision_secret: &str,
        cooldown_days: i64,
        mailer: EmailService,
        app_url: String,
    ) -> Self {
        Self {
            db,
            encoding_key: EncodingKey::from_secret(decision_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(decision_secret.as_bytes()),
            link_ttl: Duration::days(7),
            cooldown: Duration::days(cooldown_days),
            mailer,
            app_url,
        }
    }

    /// Create a trainer profile in `pending`, or reset a rejected one once
    /// the cooldown has elapsed. Issues fresh decision links on success.
    pub async fn submit_application(
        &self,
        user_id: Uuid,
        application: &TrainerApplication,
    ) -> Result<TrainerProfile, VerificationError> {
        let mut tx = self.db.begin().await?;

        let existing = sqlx::query_as::<_, TrainerProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM trainer_profiles WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let now = Utc::now();
        let profile = match existing {
            None => {
                sqlx::query_as::<_, TrainerProfile>(&format!(
                    "INSERT INTO trainer_profiles
                         (user_id, bio, specialty, hourly_rate_cents, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $5)
                     RETURNING {PROFILE_COLUMNS}"
                ))
                .bind(user_id)
                .bind(&application.bio)
                .bind(&application.specialty)
                .bind(application.hourly_rate_cents.unwrap_or(0))
                .bind(now)
                .fetch_one(&mut *tx)
                .await?
            }
            Some(profile) => match profile.status() {
                VerificationStatus::Pending => return Err(VerificationError::AlreadyPending),
                VerificationStatus::Verified => return Err(VerificationError::AlreadyVerified),
                VerificationStatus::Rejected => {
                    let rejected_at = profile.rejection_date.unwrap_or(now);
                    if let Some(remaining) = cooldown_remaining(rejected_at, now, self.cooldown) {
                        return Err(VerificationError::CooldownNotElapsed {
                            remaining_hours: remaining.num_hours().max(1),
                        });
                    }

                    sqlx::query_as::<_, TrainerProfile>(&format!(
                        "UPDATE trainer_profiles
                         SET verification_status = 'pending',
                             rejection_date = NULL,
                             bio = COALESCE($2, bio),
                             specialty = COALESCE($3, specialty),
                             hourly_rate_cents = COALESCE($4, hourly_rate_cents),
                             updated_at = $5
                         WHERE user_id = $1
                         RETURNING {PROFILE_COLUMNS}"
                    ))
                    .bind(user_id)
                    .bind(&application.bio)
                    .bind(&application.specialty)
                    .bind(application.hourly_rate_cents)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await?
                }
            },
        };

        tx.commit().await?;

        tracing::info!(%user_id, "trainer application submitted");

        // The application is committed; link delivery is best-effort.
        if let Err(e) = self.notify_ops_of_application(user_id).await {
            tracing::error!("failed to issue decision links: {e}");
        }

        Ok(profile)
    }

    /// Issue a single signed decision token for one action.
    pub fn issue_decision_token(
        &self,
        trainer_id: Uuid,
        action: DecisionAction,
    ) -> Result<String, VerificationError> {
        sign_decision_token(&self.encoding_key, trainer_id, action, self.link_ttl)
    }

    fn decision_link_url(&self, token: &str, action: DecisionAction) -> String {
        format!(
            "{}/api/auth/verify-trainer/{}?action={}",
            self.app_url,
            token,
            action.as_str()
        )
    }

    /// Redeem a decision link. The signature/expiry check and the
    /// pending-status check together make each link single-use.
    pub async fn resolve(
        &self,
        token: &str,
        requested: DecisionAction,
    ) -> Result<DecisionOutcome, VerificationError> {
        let (trainer_id, action) = decode_decision_token(&self.decoding_key, token)?;
        if action != requested {
            return Err(VerificationError::InvalidOrExpiredToken);
        }

        let mut tx = self.db.begin().await?;

        let profile = sqlx::query_as::<_, TrainerProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM trainer_profiles WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(trainer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(VerificationError::TrainerNotFound)?;

        if profile.status() != VerificationStatus::Pending {
            return Err(VerificationError::AlreadyResolved);
        }

        let now = Utc::now();
        match action {
            DecisionAction::Approve => {
                sqlx::query(
                    "UPDATE trainer_profiles
                     SET verification_status = 'verified', rejection_date = NULL, updated_at = $2
                     WHERE user_id = $1",
                )
                .bind(trainer_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            DecisionAction::Reject => {
                sqlx::query(
                    "UPDATE trainer_profiles
                     SET verification_status = 'rejected', rejection_date = $2, updated_at = $2
                     WHERE user_id = $1",
                )
                .bind(trainer_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        let trainer = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, full_name, role, created_at, updated_at
             FROM users WHERE id = $1",
        )
        .bind(trainer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(VerificationError::TrainerNotFound)?;

        insert_audit(&mut tx, trainer_id, action.as_str(), "decision-link", None).await?;

        tx.commit().await?;

        tracing::info!(%trainer_id, action = action.as_str(), "trainer application resolved");

        // Notification must not block or roll back the transition.
        let mailer = self.mailer.clone();
        let email = trainer.email.clone();
        let name = trainer.full_name.clone();
        tokio::spawn(async move {
            let result = match action {
                DecisionAction::Approve => mailer.send_application_approved(&email, &name).await,
                DecisionAction::Reject => mailer.send_application_rejected(&email, &name).await,
            };
            if let Err(e) = result {
                tracing::error!("failed to send decision notification: {e}");
            }
        });

        Ok(DecisionOutcome {
            trainer_id,
            trainer_name: trainer.full_name,
            action,
        })
    }

    /// Audited manual override. Unlike the decision-link path this can move a
    /// profile out of any state, but always records who did it and why.
    pub async fn admin_override(
        &self,
        admin_id: Uuid,
        trainer_id: Uuid,
        status: VerificationStatus,
        reason: &str,
    ) -> Result<TrainerProfile, VerificationError> {
        if reason.trim().is_empty() {
            return Err(VerificationError::ReasonRequired);
        }

        let mut tx = self.db.begin().await?;

        let existing = sqlx::query_as::<_, TrainerProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM trainer_profiles WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(trainer_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_none() {
            return Err(VerificationError::TrainerNotFound);
        }

        let now = Utc::now();
        let rejection_date = match status {
            VerificationStatus::Rejected => Some(now),
            _ => None,
        };

        let profile = sqlx::query_as::<_, TrainerProfile>(&format!(
            "UPDATE trainer_profiles
             SET verification_status = $2, rejection_date = $3, updated_at = $4
             WHERE user_id = $1
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(trainer_id)
        .bind(status.as_str())
        .bind(rejection_date)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        insert_audit(
            &mut tx,
            trainer_id,
            &format!("set-{}", status.as_str()),
            &admin_id.to_string(),
            Some(reason),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(%trainer_id, %admin_id, status = status.as_str(), "verification status overridden");

        Ok(profile)
    }

    /// Issue both decision links and mail them to the operations inbox.
    async fn notify_ops_of_application(&self, trainer_id: Uuid) -> Result<(), VerificationError> {
        let trainer = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, full_name, role, created_at, updated_at
             FROM users WHERE id = $1",
        )
        .bind(trainer_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(VerificationError::TrainerNotFound)?;

        let approve_token = self.issue_decision_token(trainer_id, DecisionAction::Approve)?;
        let reject_token = self.issue_decision_token(trainer_id, DecisionAction::Reject)?;
        let approve_url = self.decision_link_url(&approve_token, DecisionAction::Approve);
        let reject_url = self.decision_link_url(&reject_token, DecisionAction::Reject);

        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer
                .send_decision_links(
                    &trainer.full_name,
                    &trainer.email,
                    &approve_url,
                    &reject_url,
                )
                .await
            {
                tracing::error!("failed to send decision links: {e}");
            }
        });

        Ok(())
    }
}

async fn insert_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    trainer_id: Uuid,
    action: &str,
    actor: &str,
    reason: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO verification_audit (id, trainer_id, action, actor, reason, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(trainer_id)
    .bind(action)
    .bind(actor)
    .bind(reason)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(secret: &str) -> (EncodingKey, DecodingKey) {
        (
            EncodingKey::from_secret(secret.as_bytes()),
            DecodingKey::from_secret(secret.as_bytes()),
        )
    }

    #[test]
    fn test_decision_token_round_trip() {
        let (enc, dec) = keys("decision_secret");
        let trainer_id = Uuid::new_v4();

        let token =
            sign_decision_token(&enc, trainer_id, DecisionAction::Approve, Duration::days(7))
                .unwrap();

        let (decoded_id, action) = decode_decision_token(&dec, &token).unwrap();
        assert_eq!(decoded_id, trainer_id);
        assert_eq!(action, DecisionAction::Approve);
    }

    #[test]
    fn test_expired_decision_token_is_rejected() {
        let (enc, dec) = keys("decision_secret");

        // Past the 60s validation leeway.
        let token = sign_decision_token(
            &enc,
            Uuid::new_v4(),
            DecisionAction::Reject,
            Duration::seconds(-120),
        )
        .unwrap();

        assert!(matches!(
            decode_decision_token(&dec, &token),
            Err(VerificationError::InvalidOrExpiredToken)
        ));
    }

    #[test]
    fn test_decision_token_from_other_secret_is_rejected() {
        let (enc, _) = keys("secret_a");
        let (_, dec) = keys("secret_b");

        let token =
            sign_decision_token(&enc, Uuid::new_v4(), DecisionAction::Approve, Duration::days(7))
                .unwrap();

        assert!(matches!(
            decode_decision_token(&dec, &token),
            Err(VerificationError::InvalidOrExpiredToken)
        ));
    }

    #[test]
    fn test_cooldown_remaining() {
        let cooldown = Duration::days(30);
        let rejected_at = Utc::now() - Duration::days(10);

        let remaining = cooldown_remaining(rejected_at, Utc::now(), cooldown).unwrap();
        assert!(remaining <= Duration::days(20));
        assert!(remaining > Duration::days(19));

        // Elapsed cooldown clears the gate.
        let old_rejection = Utc::now() - Duration::days(31);
        assert!(cooldown_remaining(old_rejection, Utc::now(), cooldown).is_none());
    }
}
