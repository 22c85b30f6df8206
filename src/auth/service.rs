use std::sync::OnceLock;

use chrono::{Duration, Utc};
use regex::Regex;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::password::{generate_reset_token, hash_password, verify_password};
use crate::auth::{
    AuthError, AuthResponse, ForgotPasswordRequest, JwtService, LoginRequest, MessageResponse,
    RefreshTokenRequest, RegisterRequest, TokenResponse, UserInfo, UserRole, UserSession,
};
use crate::models::User;
use crate::services::{EmailService, VerificationService};

const USER_COLUMNS: &str = "id, email, password_hash, full_name, role, created_at, updated_at";

fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    let re = EMAIL_RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
    re.is_match(email)
}

#[derive(Clone)]
pub struct AuthService {
    jwt_service: JwtService,
    db: PgPool,
    verification: VerificationService,
    mailer: EmailService,
    app_url: String,
}

impl AuthService {
    pub fn new(
        db: PgPool,
        jwt_secret: &str,
        verification: VerificationService,
        mailer: EmailService,
        app_url: String,
    ) -> Self {
        Self {
            jwt_service: JwtService::new(jwt_secret),
            db,
            verification,
            mailer,
            app_url,
        }
    }

    /// Register a new user. Trainer registrations also submit a verification
    /// application; a rejected trainer re-registering before the cooldown
    /// has elapsed is refused there.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        if !is_valid_email(&request.email) {
            return Err(AuthError::Validation("invalid email address".to_string()));
        }
        if request.full_name.trim().is_empty() {
            return Err(AuthError::Validation(
                "full_name must not be empty".to_string(),
            ));
        }

        let role = request.role.unwrap_or(UserRole::Student);
        if role == UserRole::Admin {
            return Err(AuthError::Validation(
                "admin accounts cannot be self-registered".to_string(),
            ));
        }

        let password_hash = hash_password(&request.password)?;
        let now = Utc::now();
        let application = request.trainer.clone().unwrap_or_default();

        let user = match self.get_user_by_email(&request.email).await? {
            Some(existing) => {
                // Re-registration is only open to rejected trainers whose
                // cooldown has elapsed; submit_application enforces both.
                if role != UserRole::Trainer || existing.role != "trainer" {
                    return Err(AuthError::EmailAlreadyExists);
                }

                self.verification
                    .submit_application(existing.id, &application)
                    .await?;

                sqlx::query_as::<_, User>(&format!(
                    "UPDATE users SET password_hash = $2, full_name = $3, updated_at = $4
                     WHERE id = $1
                     RETURNING {USER_COLUMNS}"
                ))
                .bind(existing.id)
                .bind(&password_hash)
                .bind(request.full_name.trim())
                .bind(now)
                .fetch_one(&self.db)
                .await?
            }
            None => {
                let user = sqlx::query_as::<_, User>(&format!(
                    "INSERT INTO users (id, email, password_hash, full_name, role,
                                        created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $6)
                     RETURNING {USER_COLUMNS}"
                ))
                .bind(Uuid::new_v4())
                .bind(&request.email)
                .bind(&password_hash)
                .bind(request.full_name.trim())
                .bind(role.as_str())
                .bind(now)
                .fetch_one(&self.db)
                .await?;

                if role == UserRole::Trainer {
                    self.verification
                        .submit_application(user.id, &application)
                        .await?;
                }

                user
            }
        };

        let (access_token, refresh_token) =
            self.jwt_service.create_token_pair(user.id, &user.email, role)?;

        self.store_refresh_token(user.id, &refresh_token).await?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_service.access_token_expires_in_seconds(),
            user: UserInfo::from_user(&user),
        })
    }

    /// Login user
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let user = self
            .get_user_by_email(&request.email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let role = UserRole::from_str(&user.role).unwrap_or(UserRole::Student);

        let (access_token, refresh_token) =
            self.jwt_service.create_token_pair(user.id, &user.email, role)?;

        self.store_refresh_token(user.id, &refresh_token).await?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_service.access_token_expires_in_seconds(),
            user: UserInfo::from_user(&user),
        })
    }

    /// Refresh access token
    pub async fn refresh_token(
        &self,
        request: RefreshTokenRequest,
    ) -> Result<TokenResponse, AuthError> {
        let claims = self.jwt_service.validate_token(&request.refresh_token)?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        if !self
            .is_refresh_token_valid(user_id, &request.refresh_token)
            .await?
        {
            return Err(AuthError::InvalidToken);
        }

        let access_token =
            self.jwt_service
                .create_access_token(user_id, &claims.email, claims.role)?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_service.access_token_expires_in_seconds(),
        })
    }

    /// Logout user (blacklist token)
    pub async fn logout(&self, token: &str) -> Result<MessageResponse, AuthError> {
        let claims = self.jwt_service.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        self.blacklist_token(&claims.jti, claims.exp as i64).await?;
        self.revoke_user_refresh_tokens(user_id).await?;

        Ok(MessageResponse {
            message: "Successfully logged out".to_string(),
        })
    }

    /// Validate user session from token
    pub async fn validate_session(&self, token: &str) -> Result<UserSession, AuthError> {
        let session = self.jwt_service.extract_user_session(token)?;

        if self.is_token_blacklisted(&session.jti).await? {
            return Err(AuthError::InvalidToken);
        }

        Ok(session)
    }

    /// Issue a 15-minute reset token. The response never reveals whether the
    /// account exists.
    pub async fn forgot_password(
        &self,
        request: ForgotPasswordRequest,
    ) -> Result<MessageResponse, AuthError> {
        let generic = MessageResponse {
            message: "If an account with that email exists, a password reset link has been sent."
                .to_string(),
        };

        let Some(user) = self.get_user_by_email(&request.email).await? else {
            return Ok(generic);
        };

        let token = generate_reset_token();
        let digest = format!("{:x}", md5::compute(&token));
        let expires_at = Utc::now() + Duration::minutes(15);

        sqlx::query(
            "INSERT INTO password_reset_tokens (token_digest, user_id, expires_at)
             VALUES ($1, $2, $3)",
        )
        .bind(&digest)
        .bind(user.id)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        let reset_url = format!("{}/reset-password/{}", self.app_url, token);
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer
                .send_password_reset(&user.email, &user.full_name, &reset_url)
                .await
            {
                tracing::error!("failed to send password reset email: {e}");
            }
        });

        Ok(generic)
    }

    /// Redeem a reset token. Expiry is checked here, at redemption time.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageResponse, AuthError> {
        let digest = format!("{:x}", md5::compute(token));

        let row: Option<(Uuid, chrono::DateTime<Utc>, bool)> = sqlx::query_as(
            "SELECT user_id, expires_at, used FROM password_reset_tokens WHERE token_digest = $1",
        )
        .bind(&digest)
        .fetch_optional(&self.db)
        .await?;

        let Some((user_id, expires_at, used)) = row else {
            return Err(AuthError::InvalidResetToken);
        };

        if used || expires_at <= Utc::now() {
            return Err(AuthError::InvalidResetToken);
        }

        let password_hash = hash_password(new_password)?;

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(&password_hash)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE password_reset_tokens SET used = TRUE WHERE token_digest = $1")
            .bind(&digest)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%user_id, "password reset");

        Ok(MessageResponse {
            message: "Password reset successfully".to_string(),
        })
    }

    // Private helper methods

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    async fn store_refresh_token(&self, user_id: Uuid, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self.jwt_service.validate_token(refresh_token)?;
        let expires_at = chrono::DateTime::from_timestamp(claims.exp as i64, 0)
            .ok_or(AuthError::InvalidToken)?;

        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(format!("{:x}", md5::compute(refresh_token)))
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn is_refresh_token_valid(
        &self,
        user_id: Uuid,
        refresh_token: &str,
    ) -> Result<bool, AuthError> {
        let token_hash = format!("{:x}", md5::compute(refresh_token));

        let result = sqlx::query(
            "SELECT 1 FROM refresh_tokens
             WHERE user_id = $1 AND token_hash = $2 AND expires_at > NOW() AND NOT revoked",
        )
        .bind(user_id)
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;

        Ok(result.is_some())
    }

    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> Result<(), AuthError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn blacklist_token(&self, jti: &str, exp: i64) -> Result<(), AuthError> {
        let expires_at =
            chrono::DateTime::from_timestamp(exp, 0).ok_or(AuthError::InvalidToken)?;

        sqlx::query(
            "INSERT INTO token_blacklist (jti, expires_at) VALUES ($1, $2)
             ON CONFLICT (jti) DO NOTHING",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, AuthError> {
        let result =
            sqlx::query("SELECT 1 FROM token_blacklist WHERE jti = $1 AND expires_at > NOW()")
                .bind(jti)
                .fetch_optional(&self.db)
                .await?;

        Ok(result.is_some())
    }
}
