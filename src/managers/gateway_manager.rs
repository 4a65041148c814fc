use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::notification_manager::SharedNotificationManager;
use super::payment_manager::issue_ticket;
use crate::config::EventConfig;
use crate::error::{AppError, Result};
use crate::gateway::{self, CheckoutRequest, GatewayClient, RemoteStatus};
use crate::messages::{self, EmailEvent};
use crate::models::{DisplayStatus, Payment, PaymentStatus};
use crate::state::SharedRegistryStore;

#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub payment: Payment,
    pub payment_url: String,
}

/// Result of applying a gateway status to a stored payment
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub transaction_id: String,
    pub status: PaymentStatus,
    /// False when the payment was already final or is still pending remotely
    pub changed: bool,
    pub qr_code_id: Option<String>,
    pub warnings: Vec<String>,
}

/// Removes the in-flight marker when an initiation ends, however it ends
struct InFlight<'a> {
    map: &'a DashMap<Uuid, ()>,
    participant_id: Uuid,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.participant_id);
    }
}

/// Hosted checkout: initiation, status checks and webhook reconciliation
pub struct GatewayManager {
    store: SharedRegistryStore,
    notifications: SharedNotificationManager,
    event: Arc<EventConfig>,
    client: Option<GatewayClient>,
    in_flight: DashMap<Uuid, ()>,
}

impl GatewayManager {
    pub fn new(
        store: SharedRegistryStore,
        notifications: SharedNotificationManager,
        event: Arc<EventConfig>,
        client: Option<GatewayClient>,
    ) -> Self {
        Self {
            store,
            notifications,
            event,
            client,
            in_flight: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<&GatewayClient> {
        self.client.as_ref().ok_or_else(|| AppError::Gateway {
            message: "Online payment is not configured".to_string(),
        })
    }

    /// Create a pending payment and open a checkout session for it
    pub async fn initiate(&self, participant_id: Uuid, places: u8) -> Result<Checkout> {
        let client = self.client()?;
        if places == 0 || places > self.event.max_places {
            return Err(AppError::validation(format!(
                "Number of places must be between 1 and {}",
                self.event.max_places
            )));
        }

        if self.in_flight.insert(participant_id, ()).is_some() {
            return Err(AppError::Conflict {
                message: "A payment is already being initiated for this participant".to_string(),
            });
        }
        let _guard = InFlight {
            map: &self.in_flight,
            participant_id,
        };

        let (participant, payment) = {
            let mut db = self.store.write().await;
            let participant = db.participant(participant_id)?.clone();
            if db.display_status(participant_id) == DisplayStatus::Confirmed {
                return Err(AppError::Conflict {
                    message: format!("{} already has a confirmed payment", participant.full_name()),
                });
            }

            let now = chrono::Utc::now();
            let payment = Payment {
                id: Uuid::new_v4(),
                participant_id,
                amount: places as u64 * self.event.unit_price,
                currency: self.event.currency.clone(),
                method: "gateway".to_string(),
                status: PaymentStatus::Pending,
                transaction_id: Uuid::new_v4().simple().to_string(),
                payment_url: None,
                number_of_places: places,
                created_at: now,
                updated_at: now,
            };
            db.payments.insert(payment.id, payment.clone());
            db.touch();
            (participant, payment)
        };
        self.store.persist().await?;

        let request = CheckoutRequest {
            transaction_id: &payment.transaction_id,
            amount: payment.amount,
            currency: &payment.currency,
            description: format!("{} - {} place(s)", self.event.event_name, places),
            participant: &participant,
            return_url: format!("{}/{}", client.config().return_url, participant_id),
        };

        let outcome = client.initiate(&request).await;

        let payment = {
            let mut db = self.store.write().await;
            let stored = db
                .payments
                .get_mut(&payment.id)
                .ok_or_else(|| AppError::not_found("Payment", payment.id))?;
            stored.updated_at = chrono::Utc::now();
            match &outcome {
                Ok(session) => stored.payment_url = Some(session.payment_url.clone()),
                Err(_) => stored.status = PaymentStatus::Failed,
            }
            let stored = stored.clone();
            db.touch();
            stored
        };
        self.store.persist().await?;

        match outcome {
            Ok(session) => {
                info!(
                    "Checkout {} opened for {} ({} {})",
                    payment.transaction_id,
                    participant.full_name(),
                    payment.amount,
                    payment.currency
                );
                Ok(Checkout {
                    payment,
                    payment_url: session.payment_url,
                })
            }
            Err(e) => {
                error!("Checkout {} failed: {}", payment.transaction_id, e);
                Err(e)
            }
        }
    }

    /// Current gateway status of a transaction started here
    pub async fn check(&self, transaction_id: &str) -> Result<RemoteStatus> {
        let client = self.client()?;
        if self.store.read().await.find_payment_by_transaction(transaction_id).is_none() {
            return Err(AppError::not_found("Payment", transaction_id));
        }
        client.check(transaction_id).await
    }

    /// Handle a gateway notification.
    ///
    /// The body is never trusted for the outcome: the status is fetched again
    /// from the gateway before reconciling.
    pub async fn handle_webhook(&self, signature: Option<&str>, raw_body: &[u8]) -> Result<Reconciliation> {
        let client = self.client()?;
        if let Some(secret) = &client.config().webhook_secret {
            let valid = signature.is_some_and(|s| gateway::verify_signature(secret, raw_body, s));
            if !valid {
                warn!("Rejected webhook with missing or invalid signature");
                return Err(AppError::Unauthorized {
                    message: "Invalid webhook signature".to_string(),
                });
            }
        }

        let transaction_id = gateway::parse_transaction_id(raw_body)
            .ok_or_else(|| AppError::validation("Webhook carries no transaction id"))?;
        let remote = client.check(&transaction_id).await?;
        self.reconcile(&transaction_id, remote.status).await
    }

    /// Apply a gateway status to the stored payment; final payments stay as they are
    pub async fn reconcile(&self, transaction_id: &str, status: PaymentStatus) -> Result<Reconciliation> {
        let mut outcome = Reconciliation {
            transaction_id: transaction_id.to_string(),
            status,
            changed: false,
            qr_code_id: None,
            warnings: Vec::new(),
        };

        let applied = {
            let mut db = self.store.write().await;
            let payment = db
                .payments
                .values_mut()
                .find(|p| p.transaction_id == transaction_id)
                .ok_or_else(|| AppError::not_found("Payment", transaction_id))?;

            if payment.status != PaymentStatus::Pending {
                outcome.status = payment.status;
                None
            } else if status == PaymentStatus::Pending {
                None
            } else {
                payment.status = status;
                payment.updated_at = chrono::Utc::now();
                let payment = payment.clone();
                let ticket = match status {
                    PaymentStatus::Success => Some(issue_ticket(&mut db, payment.participant_id)?),
                    _ => None,
                };
                let participant = match &ticket {
                    Some((participant, _)) => participant.clone(),
                    None => db.participant(payment.participant_id)?.clone(),
                };
                db.touch();
                Some((payment, participant, ticket.map(|(_, qr)| qr)))
            }
        };

        let Some((payment, participant, qr_code_id)) = applied else {
            info!("Webhook for {} left payment unchanged ({:?})", transaction_id, outcome.status);
            return Ok(outcome);
        };
        self.store.persist().await?;
        outcome.changed = true;

        let warning = match &qr_code_id {
            Some(qr) => {
                info!("Gateway payment {} succeeded; QR {} issued", transaction_id, qr);
                let params = messages::payment_confirmed_params(&participant, qr, payment.number_of_places, &self.event);
                self.notifications.dispatch(EmailEvent::PaymentConfirmed, params).await
            }
            None => {
                info!("Gateway payment {} failed", transaction_id);
                let params = messages::payment_rejected_params(&participant, Some("Payment refused by the gateway"), &self.event);
                self.notifications.dispatch(EmailEvent::PaymentRejected, params).await
            }
        };
        outcome.qr_code_id = qr_code_id;
        outcome.warnings.extend(warning);
        Ok(outcome)
    }
}

pub type SharedGatewayManager = Arc<GatewayManager>;

pub fn create_shared_gateway_manager(
    store: SharedRegistryStore,
    notifications: SharedNotificationManager,
    event: Arc<EventConfig>,
    client: Option<GatewayClient>,
) -> SharedGatewayManager {
    Arc::new(GatewayManager::new(store, notifications, event, client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::managers::testing::Fixture;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "whsec_test";

    fn gateway_config(base: &str) -> GatewayConfig {
        GatewayConfig {
            api_base: base.to_string(),
            api_key: "key_test".to_string(),
            site_id: "site_test".to_string(),
            webhook_secret: Some(SECRET.to_string()),
            notify_url: "http://localhost:3000/api/payments/webhook".to_string(),
            return_url: "http://localhost:3000/pending".to_string(),
            timeout: Duration::from_millis(500),
        }
    }

    fn manager(fx: &Fixture, server: &MockServer) -> GatewayManager {
        GatewayManager::new(
            fx.store.clone(),
            fx.notifications.clone(),
            fx.event.clone(),
            Some(GatewayClient::new(gateway_config(&server.uri())).unwrap()),
        )
    }

    async fn mount_initiate(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/payment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "201",
                "message": "CREATED",
                "data": { "payment_token": "tok", "payment_url": "https://checkout.example/tok" }
            })))
            .mount(server)
            .await;
    }

    async fn mount_check(server: &MockServer, status: &str) {
        Mock::given(method("POST"))
            .and(path("/payment/check"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "00",
                "message": "SUCCES",
                "data": { "status": status }
            })))
            .mount(server)
            .await;
    }

    fn webhook_body(transaction_id: &str) -> (Vec<u8>, String) {
        let body = format!("cpm_site_id=site_test&cpm_trans_id={}", transaction_id).into_bytes();
        let signature = gateway::sign(SECRET, &body).unwrap();
        (body, signature)
    }

    #[tokio::test]
    async fn test_initiate_stores_pending_payment_with_url() {
        let fx = Fixture::new();
        let server = MockServer::start().await;
        mount_initiate(&server).await;
        let gateway = manager(&fx, &server);
        let participant = fx.participant("awa@example.com").await;

        let checkout = gateway.initiate(participant.id, 2).await.unwrap();
        assert_eq!(checkout.payment_url, "https://checkout.example/tok");
        assert_eq!(checkout.payment.status, PaymentStatus::Pending);
        assert_eq!(checkout.payment.amount, 10000);

        let db = fx.store.read().await;
        assert_eq!(db.display_status(participant.id), DisplayStatus::Pending);
    }

    #[tokio::test]
    async fn test_initiate_failure_marks_payment_failed() {
        let fx = Fixture::new();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        let gateway = manager(&fx, &server);
        let participant = fx.participant("awa@example.com").await;

        let result = gateway.initiate(participant.id, 1).await;
        assert!(matches!(result, Err(AppError::Gateway { .. })));

        let db = fx.store.read().await;
        let payments = db.payments_for(participant.id);
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        drop(db);

        // in-flight marker is released after a failure
        assert!(gateway.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_initiation_is_refused() {
        let fx = Fixture::new();
        let server = MockServer::start().await;
        let gateway = manager(&fx, &server);
        let participant = fx.participant("awa@example.com").await;

        gateway.in_flight.insert(participant.id, ());
        assert!(matches!(
            gateway.initiate(participant.id, 1).await,
            Err(AppError::Conflict { .. })
        ));
        assert!(fx.store.read().await.payments.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_success_issues_ticket_once() {
        let fx = Fixture::new();
        let server = MockServer::start().await;
        mount_initiate(&server).await;
        mount_check(&server, "ACCEPTED").await;
        let gateway = manager(&fx, &server);
        let participant = fx.participant("awa@example.com").await;
        let checkout = gateway.initiate(participant.id, 1).await.unwrap();

        let (body, signature) = webhook_body(&checkout.payment.transaction_id);
        let outcome = gateway.handle_webhook(Some(&signature), &body).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.status, PaymentStatus::Success);
        let qr = outcome.qr_code_id.unwrap();

        let replay = gateway.handle_webhook(Some(&signature), &body).await.unwrap();
        assert!(!replay.changed);
        assert!(replay.qr_code_id.is_none());

        let db = fx.store.read().await;
        assert_eq!(db.participant(participant.id).unwrap().qr_code_id.as_deref(), Some(qr.as_str()));
        assert_eq!(db.display_status(participant.id), DisplayStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_webhook_refused_marks_failed_and_notifies() {
        let fx = Fixture::new();
        let server = MockServer::start().await;
        mount_initiate(&server).await;
        mount_check(&server, "REFUSED").await;
        let gateway = manager(&fx, &server);
        let participant = fx.participant("awa@example.com").await;
        let checkout = gateway.initiate(participant.id, 1).await.unwrap();

        let (body, signature) = webhook_body(&checkout.payment.transaction_id);
        let outcome = gateway.handle_webhook(Some(&signature), &body).await.unwrap();
        assert_eq!(outcome.status, PaymentStatus::Failed);

        let db = fx.store.read().await;
        assert!(db.participant(participant.id).unwrap().qr_code_id.is_none());
        assert_eq!(db.display_status(participant.id), DisplayStatus::Rejected);
        drop(db);
        assert!(fx
            .notifications
            .list(None)
            .await
            .iter()
            .any(|n| n.event == "payment_rejected"));
    }

    #[tokio::test]
    async fn test_webhook_with_bad_signature_is_refused() {
        let fx = Fixture::new();
        let server = MockServer::start().await;
        let gateway = manager(&fx, &server);

        let (body, _) = webhook_body("abc");
        assert!(matches!(
            gateway.handle_webhook(Some("deadbeef"), &body).await,
            Err(AppError::Unauthorized { .. })
        ));
        assert!(matches!(
            gateway.handle_webhook(None, &body).await,
            Err(AppError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_disabled_gateway() {
        let fx = Fixture::new();
        let gateway = GatewayManager::new(fx.store.clone(), fx.notifications.clone(), fx.event.clone(), None);
        assert!(!gateway.is_enabled());
        let participant = fx.participant("awa@example.com").await;
        assert!(matches!(
            gateway.initiate(participant.id, 1).await,
            Err(AppError::Gateway { .. })
        ));
    }
}
