//! Outbound email transport.
//!
//! Messages are rendered by a third-party template-send API: we only supply the
//! template id and its parameters.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::EmailConfig;
use crate::error::{AppError, Result};

/// One email ready to hand to the transport
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    pub template_id: String,
    pub to_email: String,
    pub params: Map<String, Value>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<()>;
}

/// Request body of the template-send endpoint
#[derive(Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
    template_params: &'a Map<String, Value>,
}

/// EmailJS-style REST client
pub struct EmailJsMailer {
    config: EmailConfig,
    http_client: reqwest::Client,
}

impl EmailJsMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for EmailJsMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        let body = SendRequest {
            service_id: &self.config.service_id,
            template_id: &email.template_id,
            user_id: &self.config.public_key,
            access_token: self.config.private_key.as_deref(),
            template_params: &email.params,
        };

        debug!("Sending template {} to {}", email.template_id, email.to_email);

        let response = self
            .http_client
            .post(&self.config.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Email {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Email {
                message: format!("{} - {}", status, text),
            });
        }

        Ok(())
    }
}

/// Used when no email service is configured: logs instead of sending
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        info!(
            "[email disabled] template={} to={} subject={}",
            email.template_id,
            email.to_email,
            email
                .params
                .get("subject")
                .and_then(|s| s.as_str())
                .unwrap_or_default()
        );
        Ok(())
    }
}

/// Captures sent emails and can be switched to fail
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: parking_lot::Mutex<Vec<OutboundEmail>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.set_failing(true);
        mailer
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent_to(&self, email: &str) -> Vec<OutboundEmail> {
        self.sent
            .lock()
            .iter()
            .filter(|e| e.to_email == email)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::Email {
                message: "smtp relay unavailable".to_string(),
            });
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}
