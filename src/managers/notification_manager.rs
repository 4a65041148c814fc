use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EmailTemplates;
use crate::error::{AppError, Result};
use crate::mailer::{Mailer, OutboundEmail};
use crate::messages::EmailEvent;
use crate::models::{Notification, NotificationStatus};
use crate::state::SharedRegistryStore;

/// Maps workflow events to template sends and logs every attempt.
///
/// Sending never fails the caller: a failed send comes back as a warning
/// string and stays in the notification log for a manual resend.
pub struct NotificationManager {
    store: SharedRegistryStore,
    mailer: Arc<dyn Mailer>,
    templates: EmailTemplates,
}

impl NotificationManager {
    pub fn new(store: SharedRegistryStore, mailer: Arc<dyn Mailer>, templates: EmailTemplates) -> Self {
        Self {
            store,
            mailer,
            templates,
        }
    }

    /// Send the email for `event`; returns a warning when delivery failed
    pub async fn dispatch(&self, event: EmailEvent, params: Map<String, Value>) -> Option<String> {
        let recipient = params
            .get("to_email")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if recipient.is_empty() {
            warn!("No recipient for {} email, skipping", event.as_str());
            return Some(format!("No recipient configured for {} email", event.as_str()));
        }

        let email = OutboundEmail {
            template_id: event.template(&self.templates).to_string(),
            to_email: recipient,
            params,
        };

        let outcome = self.mailer.send(&email).await;
        let now = chrono::Utc::now();
        let (status, error_text) = match &outcome {
            Ok(()) => {
                info!("Sent {} email to {}", event.as_str(), email.to_email);
                (NotificationStatus::Sent, None)
            }
            Err(e) => {
                error!("Failed to send {} email to {}: {}", event.as_str(), email.to_email, e);
                (NotificationStatus::Failed, Some(e.to_string()))
            }
        };

        let notification = Notification {
            id: Uuid::new_v4(),
            event: event.as_str().to_string(),
            recipient: email.to_email.clone(),
            template_id: email.template_id,
            params: email.params,
            status,
            error: error_text.clone(),
            attempts: 1,
            created_at: now,
            last_attempt_at: now,
        };
        self.record(notification).await;

        error_text.map(|e| format!("{} email to {} was not sent: {}", event.as_str(), email.to_email, e))
    }

    async fn record(&self, notification: Notification) {
        {
            let mut db = self.store.write().await;
            db.notifications.insert(notification.id, notification);
            db.touch();
        }
        if let Err(e) = self.store.persist().await {
            error!("Failed to persist notification log: {}", e);
        }
    }

    /// Notification log, newest first
    pub async fn list(&self, status: Option<NotificationStatus>) -> Vec<Notification> {
        let db = self.store.read().await;
        let mut list: Vec<_> = db
            .notifications
            .values()
            .filter(|n| status.map_or(true, |s| n.status == s))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    /// Resend a logged email with its original parameters
    pub async fn retry(&self, id: Uuid) -> Result<Notification> {
        let notification = {
            let db = self.store.read().await;
            db.notifications
                .get(&id)
                .cloned()
                .ok_or_else(|| AppError::not_found("Notification", id))?
        };

        if notification.status == NotificationStatus::Sent {
            return Err(AppError::Conflict {
                message: format!("Notification {} was already delivered", id),
            });
        }

        let email = OutboundEmail {
            template_id: notification.template_id.clone(),
            to_email: notification.recipient.clone(),
            params: notification.params.clone(),
        };
        let outcome = self.mailer.send(&email).await;

        let updated = {
            let mut db = self.store.write().await;
            let entry = db
                .notifications
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found("Notification", id))?;
            entry.attempts += 1;
            entry.last_attempt_at = chrono::Utc::now();
            match &outcome {
                Ok(()) => {
                    entry.status = NotificationStatus::Sent;
                    entry.error = None;
                }
                Err(e) => {
                    entry.error = Some(e.to_string());
                }
            }
            let updated = entry.clone();
            db.touch();
            updated
        };
        self.store.persist().await?;

        match outcome {
            Ok(()) => {
                info!("Resent {} email to {}", updated.event, updated.recipient);
                Ok(updated)
            }
            Err(e) => Err(e),
        }
    }
}

pub type SharedNotificationManager = Arc<NotificationManager>;

pub fn create_shared_notification_manager(
    store: SharedRegistryStore,
    mailer: Arc<dyn Mailer>,
    templates: EmailTemplates,
) -> SharedNotificationManager {
    Arc::new(NotificationManager::new(store, mailer, templates))
}
