use anyhow::Result;
use std::env;

/// SMTP delivery settings. Absent configuration degrades the mailer to
/// log-only mode.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub jwt_secret: String,
    /// Separate signing secret for trainer verification decision links.
    pub decision_link_secret: String,
    /// Public base URL used when building links embedded in emails.
    pub app_url: String,
    /// Days a rejected trainer must wait before re-applying.
    pub trainer_cooldown_days: i64,
    pub gateway_secret_key: Option<String>,
    pub gateway_webhook_secret: Option<String>,
    pub gateway_api_base: String,
    pub smtp: Option<SmtpConfig>,
    /// Inbox that receives trainer application decision links.
    pub ops_email: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "your-secret-key-change-in-production".to_string());
        let decision_link_secret =
            env::var("DECISION_LINK_SECRET").unwrap_or_else(|_| jwt_secret.clone());
        let app_url = env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let trainer_cooldown_days = env::var("TRAINER_REAPPLY_COOLDOWN_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let gateway_secret_key = env::var("PAYMENT_GATEWAY_SECRET_KEY").ok();
        let gateway_webhook_secret = env::var("PAYMENT_GATEWAY_WEBHOOK_SECRET").ok();
        let gateway_api_base = env::var("PAYMENT_GATEWAY_API_BASE")
            .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string());

        let smtp = env::var("SMTP_HOST").ok().map(|smtp_host| SmtpConfig {
            host: smtp_host,
            port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .unwrap_or(587),
            username: env::var("SMTP_USERNAME").unwrap_or_default(),
            password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_email: env::var("SMTP_FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@trainhub.app".to_string()),
            from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "TrainHub".to_string()),
        });

        let ops_email =
            env::var("OPS_EMAIL").unwrap_or_else(|_| "verifications@trainhub.app".to_string());

        Ok(AppConfig {
            host,
            port,
            environment,
            jwt_secret,
            decision_link_secret,
            app_url,
            trainer_cooldown_days,
            gateway_secret_key,
            gateway_webhook_secret,
            gateway_api_base,
            smtp,
            ops_email,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
