use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
    #[error("Failed to build email message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("Email delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification mailer. All callers treat sends as fire-and-forget:
/// a failed delivery is logged, never surfaced to the request that caused it.
#[derive(Clone)]
pub struct EmailService {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
    ops_email: String,
}

impl EmailService {
    pub fn new(smtp: Option<SmtpConfig>, ops_email: String) -> Self {
        let transport = smtp.as_ref().and_then(|cfg| {
            match AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host) {
                Ok(builder) => Some(
                    builder
                        .port(cfg.port)
                        .credentials(Credentials::new(
                            cfg.username.clone(),
                            cfg.password.clone(),
                        ))
                        .build(),
                ),
                Err(e) => {
                    tracing::warn!("invalid SMTP configuration ({e}), emails will be logged only");
                    None
                }
            }
        });

        let from = smtp
            .map(|cfg| format!("{} <{}>", cfg.from_name, cfg.from_email))
            .unwrap_or_else(|| "TrainHub <noreply@trainhub.app>".to_string());

        Self {
            transport,
            from,
            ops_email,
        }
    }

    async fn send(&self, to: &str, subject: &str, html: String) -> Result<(), EmailError> {
        let Some(transport) = &self.transport else {
            tracing::info!(to, subject, "SMTP not configured, logging email instead");
            return Ok(());
        };

        let message = Message::builder()
            .from(
                self.from
                    .parse::<Mailbox>()
                    .map_err(|_| EmailError::InvalidAddress(self.from.clone()))?,
            )
            .to(to
                .parse::<Mailbox>()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;

        transport
            .send(message)
            .await
            .map_err(|e| EmailError::Delivery(e.to_string()))?;

        tracing::info!(to, subject, "sent email");
        Ok(())
    }

    /// Notify the operations inbox of a new trainer application, including
    /// the one-click approve/reject decision links.
    pub async fn send_decision_links(
        &self,
        trainer_name: &str,
        trainer_email: &str,
        approve_url: &str,
        reject_url: &str,
    ) -> Result<(), EmailError> {
        let subject = format!("Trainer application: {trainer_name}");
        let html = format!(
            r#"<html><body>
<h2>New trainer application</h2>
<p><strong>{trainer_name}</strong> ({trainer_email}) has applied to teach on TrainHub.</p>
<p><a href="{approve_url}">Approve this application</a></p>
<p><a href="{reject_url}">Reject this application</a></p>
<p>Each link can be used once and expires in 7 days.</p>
</body></html>"#
        );
        self.send(&self.ops_email, &subject, html).await
    }

    pub async fn send_application_approved(
        &self,
        to: &str,
        trainer_name: &str,
    ) -> Result<(), EmailError> {
        let html = format!(
            r#"<html><body>
<h2>Welcome aboard, {trainer_name}!</h2>
<p>Your trainer application has been approved. Your profile is now visible to students and you can start accepting bookings.</p>
</body></html>"#
        );
        self.send(to, "Your trainer application was approved", html)
            .await
    }

    pub async fn send_application_rejected(
        &self,
        to: &str,
        trainer_name: &str,
    ) -> Result<(), EmailError> {
        let html = format!(
            r#"<html><body>
<h2>Hi {trainer_name},</h2>
<p>Unfortunately we are unable to approve your trainer application at this time. You may apply again once the waiting period has passed.</p>
</body></html>"#
        );
        self.send(to, "Your trainer application was not approved", html)
            .await
    }

    pub async fn send_password_reset(
        &self,
        to: &str,
        user_name: &str,
        reset_url: &str,
    ) -> Result<(), EmailError> {
        let html = format!(
            r#"<html><body>
<h2>Hi {user_name},</h2>
<p>We received a request to reset your password. The link below is valid for 15 minutes:</p>
<p><a href="{reset_url}">Reset your password</a></p>
<p>If you did not request this, you can safely ignore this email.</p>
</body></html>"#
        );
        self.send(to, "Reset your TrainHub password", html).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_mailer_logs_instead_of_failing() {
        let mailer = EmailService::new(None, "ops@example.com".to_string());

        let result = mailer
            .send_password_reset("user@example.com", "User", "http://localhost/reset/abc")
            .await;

        assert!(result.is_ok());
    }
}
