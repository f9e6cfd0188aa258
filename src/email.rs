use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::state::AppState;

/// Outbound notification mail. Implementations must be safe to call from a
/// spawned task; delivery failures are the caller's to log, never to surface.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str) -> anyhow::Result<()>;
}

/// SendGrid v3 mail/send.
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl SendGridMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, to: &str, subject: &str, text: &str) -> anyhow::Result<()> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": text }],
        });
        let resp = self
            .client
            .post("https://api.sendgrid.com/v3/mail/send")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("sendgrid responded {}", resp.status());
        }
        Ok(())
    }
}

/// Used when no API key is configured, and in tests.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, to: &str, subject: &str, _text: &str) -> anyhow::Result<()> {
        debug!(to, subject, "mail disabled, dropping message");
        Ok(())
    }
}

/// Welcome notification for a fresh signup. Dispatched to the administrative
/// address, fire-and-forget.
pub fn send_welcome_email(state: &AppState, name: &str) {
    dispatch(
        state,
        "Welcome to the task manager app!",
        format!("Hello there {name}. Let me know how you get along with the app."),
    );
}

/// Cancellation notification for a deleted account.
pub fn send_cancellation_email(state: &AppState, name: &str) {
    dispatch(
        state,
        "You have deleted your account!",
        format!("We are sorry to see you go {name}. Is there anything we could have do to make you stay?"),
    );
}

fn dispatch(state: &AppState, subject: &'static str, text: String) {
    let mailer = state.mailer.clone();
    let to = state.config.mail.admin_address.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&to, subject, &text).await {
            warn!(error = %e, subject, "notification email failed");
        }
    });
}
