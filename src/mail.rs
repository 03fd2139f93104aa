//! Outbound email. The transport is pluggable: `HttpMailer` posts to a
//! transactional-email HTTP API, `LogMailer` only logs (local development).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("email transport failed: {0}")]
    Transport(String),

    #[error("email provider rejected message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "email send stub");
        // The body can carry a live reset token.
        tracing::debug!(to = %email.to, body = %email.body, "email send stub body");
        Ok(())
    }
}

pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(url: String, api_key: Option<String>, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let mut request = self.client.post(&self.url).json(&json!({
            "from": self.from,
            "to": email.to,
            "subject": email.subject,
            "text": email.body,
        }));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Rejected(format!("{status}: {body}")));
        }

        tracing::debug!(to = %email.to, "email accepted by provider");
        Ok(())
    }
}

/// Picks the HTTP transport when an email API is configured.
pub fn from_config(config: &Config) -> Arc<dyn Mailer> {
    match config.email_api_url {
        Some(ref url) => Arc::new(HttpMailer::new(
            url.clone(),
            config.email_api_key.clone(),
            config.email_from.clone(),
        )),
        None => {
            tracing::warn!("EMAIL_API_URL not set, emails will only be logged");
            Arc::new(LogMailer)
        }
    }
}
