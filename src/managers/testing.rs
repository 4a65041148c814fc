//! Shared in-memory setup for manager tests

use std::sync::Arc;
use uuid::Uuid;

use super::*;
use crate::config::{EmailTemplates, EventConfig};
use crate::mailer::RecordingMailer;
use crate::models::{ManualPaymentMethod, Participant};
use crate::state::{RegistryStore, SharedRegistryStore};
use payment_manager::{GuestName, ManualPaymentForm};
use registration_manager::NewParticipant;

pub struct Fixture {
    pub store: SharedRegistryStore,
    pub mailer: Arc<RecordingMailer>,
    pub event: Arc<EventConfig>,
    pub notifications: SharedNotificationManager,
    pub registrations: SharedRegistrationManager,
    pub payments: SharedPaymentManager,
    pub memberships: SharedMembershipManager,
    pub check_ins: SharedCheckInManager,
}

impl Fixture {
    pub fn new() -> Self {
        let store: SharedRegistryStore = Arc::new(RegistryStore::in_memory());
        let mailer = Arc::new(RecordingMailer::default());
        let event = Arc::new(EventConfig {
            admin_email: "admin@example.com".to_string(),
            ..EventConfig::default()
        });
        let notifications = create_shared_notification_manager(
            store.clone(),
            mailer.clone(),
            EmailTemplates::uniform("template_test"),
        );

        Self {
            registrations: create_shared_registration_manager(store.clone(), notifications.clone(), event.clone()),
            payments: create_shared_payment_manager(store.clone(), notifications.clone(), event.clone()),
            memberships: create_shared_membership_manager(store.clone(), notifications.clone(), event.clone()),
            check_ins: create_shared_checkin_manager(store.clone()),
            notifications,
            store,
            mailer,
            event,
        }
    }

    pub async fn participant(&self, email: &str) -> Participant {
        self.registrations
            .register(NewParticipant {
                first_name: "Awa".to_string(),
                last_name: "Traore".to_string(),
                email: email.to_string(),
                phone: "0701020304".to_string(),
                is_member: false,
            })
            .await
            .unwrap()
            .participant
    }

    /// Submit and validate a manual payment; returns the issued QR id
    pub async fn confirmed_ticket(&self, participant_id: Uuid, places: u8) -> String {
        let submission = self
            .payments
            .submit_manual_payment(ManualPaymentForm {
                participant_id,
                method: ManualPaymentMethod::Wave,
                phone_number: "0701020304".to_string(),
                comment: None,
                number_of_places: places,
                guests: (1..places)
                    .map(|i| GuestName {
                        first_name: format!("Guest{}", i),
                        last_name: "Kone".to_string(),
                    })
                    .collect(),
            })
            .await
            .unwrap();

        self.payments
            .validate(submission.payment.id, "admin@example.com")
            .await
            .unwrap()
            .qr_code_id
    }
}
