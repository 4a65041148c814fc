use futures::future::join;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::notification_manager::SharedNotificationManager;
use crate::config::EventConfig;
use crate::error::{AppError, Result};
use crate::messages::{self, EmailEvent};
use crate::models::{
    Guest, ManualPayment, ManualPaymentMethod, ManualPaymentStatus, Participant,
};
use crate::state::{RegistryDatabase, SharedRegistryStore};
use crate::validation::{normalize_phone, optional_text, require_name};

const QR_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const QR_CODE_LENGTH: usize = 12;

/// Random ticket identifier, e.g. `EVT-7KQ2M9XH4TRA`
pub fn generate_qr_code_id() -> String {
    let mut rng = rand::thread_rng();
    let code: String = (0..QR_CODE_LENGTH)
        .map(|_| QR_ALPHABET[rng.gen_range(0..QR_ALPHABET.len())] as char)
        .collect();
    format!("EVT-{}", code)
}

/// Write a fresh QR id on the participant and return it
pub(crate) fn issue_ticket(db: &mut RegistryDatabase, participant_id: Uuid) -> Result<(Participant, String)> {
    let qr_code_id = generate_qr_code_id();
    let participant = db.participant_mut(participant_id)?;
    participant.qr_code_id = Some(qr_code_id.clone());
    participant.updated_at = chrono::Utc::now();
    Ok((participant.clone(), qr_code_id))
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuestName {
    pub first_name: String,
    pub last_name: String,
}

/// Manual payment form
#[derive(Debug, Clone, Deserialize)]
pub struct ManualPaymentForm {
    pub participant_id: Uuid,
    pub method: ManualPaymentMethod,
    pub phone_number: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub number_of_places: u8,
    /// Names for the places beyond the participant's own
    #[serde(default)]
    pub guests: Vec<GuestName>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualPaymentSubmission {
    pub payment: ManualPayment,
    pub guests: Vec<Guest>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub payment: ManualPayment,
    pub participant: Participant,
    pub qr_code_id: String,
    pub qr_code_url: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectionOutcome {
    pub payment: ManualPayment,
    pub warnings: Vec<String>,
}

/// Pending-list row for the validation page
#[derive(Debug, Clone, Serialize)]
pub struct ManualPaymentView {
    #[serde(flatten)]
    pub payment: ManualPayment,
    pub participant: Option<Participant>,
    pub guests: Vec<Guest>,
}

/// Manual payment intake and admin validation
pub struct PaymentManager {
    store: SharedRegistryStore,
    notifications: SharedNotificationManager,
    event: Arc<EventConfig>,
}

impl PaymentManager {
    pub fn new(
        store: SharedRegistryStore,
        notifications: SharedNotificationManager,
        event: Arc<EventConfig>,
    ) -> Self {
        Self {
            store,
            notifications,
            event,
        }
    }

    /// Record a manual payment and one guest row per place
    pub async fn submit_manual_payment(&self, form: ManualPaymentForm) -> Result<ManualPaymentSubmission> {
        let phone_number = normalize_phone(&form.phone_number)?;
        let places = form.number_of_places;
        if places == 0 || places > self.event.max_places {
            return Err(AppError::validation(format!(
                "Number of places must be between 1 and {}",
                self.event.max_places
            )));
        }
        let expected_guests = places as usize - 1;
        if form.guests.len() != expected_guests {
            return Err(AppError::validation(format!(
                "Expected {} guest name(s) for {} place(s), got {}",
                expected_guests,
                places,
                form.guests.len()
            )));
        }
        let guest_names = form
            .guests
            .iter()
            .map(|g| {
                Ok((
                    require_name(&g.first_name, "Guest first name")?,
                    require_name(&g.last_name, "Guest last name")?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let (participant, payment, guests) = {
            let mut db = self.store.write().await;
            let participant = db.participant(form.participant_id)?.clone();

            let now = chrono::Utc::now();
            let payment = ManualPayment {
                id: Uuid::new_v4(),
                participant_id: participant.id,
                amount: places as u64 * self.event.unit_price,
                method: form.method,
                phone_number,
                comment: optional_text(form.comment.as_deref()),
                number_of_places: places,
                status: ManualPaymentStatus::Pending,
                validated_by: None,
                validated_at: None,
                rejection_reason: None,
                created_at: now,
            };

            let mut guests = Vec::with_capacity(places as usize);
            guests.push(Guest {
                id: Uuid::new_v4(),
                manual_payment_id: payment.id,
                first_name: participant.first_name.clone(),
                last_name: participant.last_name.clone(),
                is_main_participant: true,
                created_at: now,
            });
            for (first_name, last_name) in guest_names {
                guests.push(Guest {
                    id: Uuid::new_v4(),
                    manual_payment_id: payment.id,
                    first_name,
                    last_name,
                    is_main_participant: false,
                    created_at: now,
                });
            }

            db.manual_payments.insert(payment.id, payment.clone());
            for guest in &guests {
                db.guests.insert(guest.id, guest.clone());
            }
            db.touch();
            (participant, payment, guests)
        };
        self.store.persist().await?;

        info!(
            "Manual payment {} submitted for {} ({} place(s), {} {})",
            payment.id,
            participant.full_name(),
            places,
            payment.amount,
            self.event.currency
        );

        // Participant acknowledgement and admin notification are independent
        let guest_refs: Vec<&Guest> = guests.iter().collect();
        let ack = messages::payment_pending_params(&participant, &payment, &guest_refs, &self.event);
        let admin = messages::admin_payment_params(&participant, &payment, &guest_refs, &self.event);
        let (ack_warning, admin_warning) = join(
            self.notifications.dispatch(EmailEvent::PaymentPending, ack),
            self.notifications.dispatch(EmailEvent::AdminPayment, admin),
        )
        .await;

        Ok(ManualPaymentSubmission {
            payment,
            guests,
            warnings: ack_warning.into_iter().chain(admin_warning).collect(),
        })
    }

    /// Manual payments joined with participant and guests, newest first
    pub async fn list_manual_payments(&self, status: Option<ManualPaymentStatus>) -> Vec<ManualPaymentView> {
        let db = self.store.read().await;
        let mut list: Vec<_> = db
            .manual_payments
            .values()
            .filter(|m| status.map_or(true, |s| m.status == s))
            .map(|m| ManualPaymentView {
                payment: m.clone(),
                participant: db.participants.get(&m.participant_id).cloned(),
                guests: db.guests_for(m.id).into_iter().cloned().collect(),
            })
            .collect();
        list.sort_by(|a, b| b.payment.created_at.cmp(&a.payment.created_at));
        list
    }

    /// Mark a manual payment completed, issue the QR ticket and email it.
    ///
    /// Re-validating a completed payment issues a new QR id; the old one stops
    /// matching at check-in.
    pub async fn validate(&self, payment_id: Uuid, admin: &str) -> Result<ValidationOutcome> {
        let (payment, participant, qr_code_id) = {
            let mut db = self.store.write().await;
            let payment = db
                .manual_payments
                .get_mut(&payment_id)
                .ok_or_else(|| AppError::not_found("Manual payment", payment_id))?;

            if payment.status == ManualPaymentStatus::Rejected {
                return Err(AppError::InvalidTransition {
                    entity: "manual payment",
                    action: "validate",
                    status: payment.status.as_str().to_string(),
                });
            }
            if payment.status == ManualPaymentStatus::Completed {
                warn!("Manual payment {} is already completed; issuing a new QR code", payment_id);
            }

            payment.status = ManualPaymentStatus::Completed;
            payment.validated_by = Some(admin.to_string());
            payment.validated_at = Some(chrono::Utc::now());
            let payment = payment.clone();

            let (participant, qr_code_id) = issue_ticket(&mut db, payment.participant_id)?;
            db.touch();
            (payment, participant, qr_code_id)
        };
        self.store.persist().await?;

        info!(
            "Manual payment {} validated by {}; QR {} issued to {}",
            payment_id,
            admin,
            qr_code_id,
            participant.full_name()
        );

        let params = messages::payment_confirmed_params(
            &participant,
            &qr_code_id,
            payment.number_of_places,
            &self.event,
        );
        let warnings = self
            .notifications
            .dispatch(EmailEvent::PaymentConfirmed, params)
            .await
            .into_iter()
            .collect();

        Ok(ValidationOutcome {
            qr_code_url: self.event.qr_image_url(&qr_code_id),
            payment,
            participant,
            qr_code_id,
            warnings,
        })
    }

    /// Mark a pending manual payment rejected and notify the payer
    pub async fn reject(&self, payment_id: Uuid, admin: &str, reason: Option<&str>) -> Result<RejectionOutcome> {
        let reason = optional_text(reason);
        let (payment, participant) = {
            let mut db = self.store.write().await;
            let payment = db
                .manual_payments
                .get_mut(&payment_id)
                .ok_or_else(|| AppError::not_found("Manual payment", payment_id))?;

            if payment.status != ManualPaymentStatus::Pending {
                return Err(AppError::InvalidTransition {
                    entity: "manual payment",
                    action: "reject",
                    status: payment.status.as_str().to_string(),
                });
            }

            payment.status = ManualPaymentStatus::Rejected;
            payment.validated_by = Some(admin.to_string());
            payment.validated_at = Some(chrono::Utc::now());
            payment.rejection_reason = reason.clone();
            let payment = payment.clone();
            let participant = db.participant(payment.participant_id)?.clone();
            db.touch();
            (payment, participant)
        };
        self.store.persist().await?;

        info!("Manual payment {} rejected by {}", payment_id, admin);

        let params = messages::payment_rejected_params(&participant, reason.as_deref(), &self.event);
        let warnings = self
            .notifications
            .dispatch(EmailEvent::PaymentRejected, params)
            .await
            .into_iter()
            .collect();

        Ok(RejectionOutcome { payment, warnings })
    }
}

pub type SharedPaymentManager = Arc<PaymentManager>;

pub fn create_shared_payment_manager(
    store: SharedRegistryStore,
    notifications: SharedNotificationManager,
    event: Arc<EventConfig>,
) -> SharedPaymentManager {
    Arc::new(PaymentManager::new(store, notifications, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::testing::Fixture;
    use crate::models::{DisplayStatus, NotificationStatus};

    fn form(participant_id: Uuid, places: u8) -> ManualPaymentForm {
        ManualPaymentForm {
            participant_id,
            method: ManualPaymentMethod::OrangeMoney,
            phone_number: "0701020304".to_string(),
            comment: Some("  ".to_string()),
            number_of_places: places,
            guests: (1..places)
                .map(|i| GuestName {
                    first_name: format!("Guest{}", i),
                    last_name: "Diallo".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_qr_code_id_shape() {
        let id = generate_qr_code_id();
        assert!(id.starts_with("EVT-"));
        assert_eq!(id.len(), 4 + QR_CODE_LENGTH);
        assert!(id[4..].bytes().all(|b| QR_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn test_three_places_create_three_guests_one_main() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;

        let submission = fx.payments.submit_manual_payment(form(participant.id, 3)).await.unwrap();

        assert_eq!(submission.guests.len(), 3);
        assert_eq!(submission.guests.iter().filter(|g| g.is_main_participant).count(), 1);
        assert_eq!(submission.payment.amount, 3 * 5000);
        assert_eq!(submission.payment.comment, None);
        assert_eq!(submission.payment.status, ManualPaymentStatus::Pending);

        let db = fx.store.read().await;
        assert_eq!(db.guests_for(submission.payment.id).len(), 3);
        assert_eq!(db.display_status(participant.id), DisplayStatus::Pending);
    }

    #[tokio::test]
    async fn test_submission_sends_ack_and_admin_emails() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;

        fx.payments.submit_manual_payment(form(participant.id, 1)).await.unwrap();

        // registration + acknowledgement
        assert_eq!(fx.mailer.sent_to("awa@example.com").len(), 2);
        assert_eq!(fx.mailer.sent_to("admin@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_submission_rejects_bad_input() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;

        let mut bad_phone = form(participant.id, 1);
        bad_phone.phone_number = "070102".to_string();
        assert!(matches!(
            fx.payments.submit_manual_payment(bad_phone).await,
            Err(AppError::Validation { .. })
        ));

        assert!(fx.payments.submit_manual_payment(form(participant.id, 11)).await.is_err());
        assert!(fx.payments.submit_manual_payment(form(participant.id, 0)).await.is_err());

        let mut missing_guest = form(participant.id, 3);
        missing_guest.guests.pop();
        assert!(fx.payments.submit_manual_payment(missing_guest).await.is_err());

        assert!(matches!(
            fx.payments.submit_manual_payment(form(Uuid::new_v4(), 1)).await,
            Err(AppError::NotFound { .. })
        ));
        assert!(fx.payments.list_manual_payments(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_email_failure_does_not_roll_back_submission() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        fx.mailer.set_failing(true);

        let submission = fx.payments.submit_manual_payment(form(participant.id, 2)).await.unwrap();
        assert_eq!(submission.warnings.len(), 2);
        assert_eq!(fx.payments.list_manual_payments(Some(ManualPaymentStatus::Pending)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_validate_issues_qr_and_sends_confirmation() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        let submission = fx.payments.submit_manual_payment(form(participant.id, 2)).await.unwrap();

        let outcome = fx.payments.validate(submission.payment.id, "admin@example.com").await.unwrap();

        assert_eq!(outcome.payment.status, ManualPaymentStatus::Completed);
        assert_eq!(outcome.payment.validated_by.as_deref(), Some("admin@example.com"));
        assert_eq!(outcome.participant.qr_code_id.as_deref(), Some(outcome.qr_code_id.as_str()));
        assert!(outcome.qr_code_url.ends_with(&outcome.qr_code_id));

        let confirmations: Vec<_> = fx
            .mailer
            .sent_to("awa@example.com")
            .into_iter()
            .filter(|e| e.params.get("qr_code_id").is_some())
            .collect();
        assert_eq!(confirmations.len(), 1);
        assert_eq!(confirmations[0].params["qr_code_id"], outcome.qr_code_id.as_str());

        let db = fx.store.read().await;
        assert_eq!(db.display_status(participant.id), DisplayStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_validate_twice_issues_two_different_qr_codes() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        let submission = fx.payments.submit_manual_payment(form(participant.id, 1)).await.unwrap();

        let first = fx.payments.validate(submission.payment.id, "admin").await.unwrap();
        let second = fx.payments.validate(submission.payment.id, "admin").await.unwrap();
        assert_ne!(first.qr_code_id, second.qr_code_id);

        let db = fx.store.read().await;
        assert_eq!(
            db.participant(participant.id).unwrap().qr_code_id.as_deref(),
            Some(second.qr_code_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_validation_commits_even_when_email_fails() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        let submission = fx.payments.submit_manual_payment(form(participant.id, 1)).await.unwrap();
        fx.mailer.set_failing(true);

        let outcome = fx.payments.validate(submission.payment.id, "admin").await.unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.payment.status, ManualPaymentStatus::Completed);

        let failed = fx.notifications.list(Some(NotificationStatus::Failed)).await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].event, "payment_confirmed");
    }

    #[tokio::test]
    async fn test_reject_never_touches_qr_code() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;

        let first = fx.payments.submit_manual_payment(form(participant.id, 1)).await.unwrap();
        let validated = fx.payments.validate(first.payment.id, "admin").await.unwrap();

        let second = fx.payments.submit_manual_payment(form(participant.id, 1)).await.unwrap();
        let rejected = fx
            .payments
            .reject(second.payment.id, "admin", Some("Transfer not received"))
            .await
            .unwrap();

        assert_eq!(rejected.payment.status, ManualPaymentStatus::Rejected);
        assert_eq!(rejected.payment.rejection_reason.as_deref(), Some("Transfer not received"));

        let db = fx.store.read().await;
        let participant = db.participant(participant.id).unwrap();
        assert_eq!(participant.qr_code_id.as_deref(), Some(validated.qr_code_id.as_str()));
        assert_eq!(db.display_status(participant.id), DisplayStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        let submission = fx.payments.submit_manual_payment(form(participant.id, 1)).await.unwrap();

        fx.payments.reject(submission.payment.id, "admin", None).await.unwrap();
        assert!(matches!(
            fx.payments.reject(submission.payment.id, "admin", None).await,
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(matches!(
            fx.payments.validate(submission.payment.id, "admin").await,
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(fx.store.read().await.participant(participant.id).unwrap().qr_code_id.is_none());
        assert!(matches!(
            fx.payments.validate(Uuid::new_v4(), "admin").await,
            Err(AppError::NotFound { .. })
        ));
    }
}
