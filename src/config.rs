use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub sendgrid_api_key: Option<String>,
    pub from_address: String,
    /// Notifications go to a fixed administrative address, not the end user.
    pub admin_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "taskman".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "taskman-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 7),
        };
        let mail = MailConfig {
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY").ok(),
            from_address: std::env::var("SENDGRID_FROM_ADDRESS")
                .unwrap_or_else(|_| "noreply@taskman.local".into()),
            admin_address: std::env::var("SENDGRID_TO_ADDRESS")
                .unwrap_or_else(|_| "admin@taskman.local".into()),
        };
        Ok(Self {
            database_url,
            jwt,
            mail,
        })
    }
}
