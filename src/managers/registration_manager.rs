use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::notification_manager::SharedNotificationManager;
use crate::config::EventConfig;
use crate::error::{AppError, Result};
use crate::messages::{self, EmailEvent};
use crate::models::{
    CheckIn, DisplayStatus, Guest, ManualPayment, ManualPaymentStatus, MembershipStatus,
    Participant, Payment, PaymentStatus,
};
use crate::state::{RegistryDatabase, SharedRegistryStore};
use crate::validation::{normalize_email, normalize_phone, require_name};

/// Sign-up form
#[derive(Debug, Clone, Deserialize)]
pub struct NewParticipant {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub is_member: bool,
}

/// Partial update from the admin panel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParticipantUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_member: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub participant: Participant,
    pub warnings: Vec<String>,
}

/// Participant with derived payment status, as listed to admins
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSummary {
    #[serde(flatten)]
    pub participant: Participant,
    pub payment_status: DisplayStatus,
    pub badge: Option<&'static str>,
    pub places: Option<u8>,
}

impl ParticipantSummary {
    pub fn build(db: &RegistryDatabase, participant: &Participant) -> Self {
        let status = db.display_status(participant.id);
        Self {
            participant: participant.clone(),
            payment_status: status,
            badge: status.badge(),
            places: db.confirmed_places(participant.id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualPaymentWithGuests {
    #[serde(flatten)]
    pub payment: ManualPayment,
    pub guests: Vec<Guest>,
}

/// Everything known about one participant
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantDetail {
    #[serde(flatten)]
    pub summary: ParticipantSummary,
    pub payments: Vec<Payment>,
    pub manual_payments: Vec<ManualPaymentWithGuests>,
    pub check_ins: Vec<CheckIn>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DashboardStats {
    pub participants: usize,
    pub confirmed: usize,
    pub pending: usize,
    pub rejected: usize,
    pub unpaid: usize,
    pub checked_in: usize,
    pub pending_manual_payments: usize,
    pub pending_memberships: usize,
    pub confirmed_places: u64,
    pub revenue: u64,
}

/// Participant registry: sign-up and admin CRUD
pub struct RegistrationManager {
    store: SharedRegistryStore,
    notifications: SharedNotificationManager,
    event: Arc<EventConfig>,
}

impl RegistrationManager {
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

    /// Register a participant and send the registration email
    pub async fn register(&self, form: NewParticipant) -> Result<Registration> {
        let first_name = require_name(&form.first_name, "First name")?;
        let last_name = require_name(&form.last_name, "Last name")?;
        let email = normalize_email(&form.email)?;
        let phone = normalize_phone(&form.phone)?;

        let participant = {
            let mut db = self.store.write().await;
            if db.find_participant_by_email(&email).is_some() {
                return Err(AppError::Conflict {
                    message: format!("A participant is already registered with {}", email),
                });
            }
            let participant = Participant::new(first_name, last_name, email, phone, form.is_member);
            db.participants.insert(participant.id, participant.clone());
            db.touch();
            participant
        };
        self.store.persist().await?;

        info!("Registered participant {} ({})", participant.full_name(), participant.id);

        let mut warnings = Vec::new();
        let params = messages::registration_params(&participant, &self.event);
        if let Some(w) = self.notifications.dispatch(EmailEvent::Registration, params).await {
            warnings.push(w);
        }

        Ok(Registration {
            participant,
            warnings,
        })
    }

    /// All participants with their payment status, optionally filtered
    pub async fn list(&self, status: Option<DisplayStatus>, search: Option<&str>) -> Vec<ParticipantSummary> {
        let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let db = self.store.read().await;
        db.participants_sorted()
            .into_iter()
            .filter(|p| match &needle {
                Some(n) => {
                    p.full_name().to_lowercase().contains(n)
                        || p.email.contains(n)
                        || p.phone.contains(n)
                }
                None => true,
            })
            .map(|p| ParticipantSummary::build(&db, p))
            .filter(|s| status.map_or(true, |st| s.payment_status == st))
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<ParticipantDetail> {
        let db = self.store.read().await;
        let participant = db.participant(id)?;

        let manual_payments = db
            .manual_payments_for(id)
            .into_iter()
            .map(|m| ManualPaymentWithGuests {
                payment: m.clone(),
                guests: db.guests_for(m.id).into_iter().cloned().collect(),
            })
            .collect();

        let mut check_ins: Vec<CheckIn> = db
            .check_ins
            .values()
            .filter(|c| c.participant_id == id)
            .cloned()
            .collect();
        check_ins.sort_by(|a, b| b.checked_in_at.cmp(&a.checked_in_at));

        Ok(ParticipantDetail {
            summary: ParticipantSummary::build(&db, participant),
            payments: db.payments_for(id).into_iter().cloned().collect(),
            manual_payments,
            check_ins,
        })
    }

    pub async fn update(&self, id: Uuid, update: ParticipantUpdate) -> Result<Participant> {
        // Everything is checked before the row is touched
        let first_name = update
            .first_name
            .as_deref()
            .map(|n| require_name(n, "First name"))
            .transpose()?;
        let last_name = update
            .last_name
            .as_deref()
            .map(|n| require_name(n, "Last name"))
            .transpose()?;
        let email = update.email.as_deref().map(normalize_email).transpose()?;
        let phone = update.phone.as_deref().map(normalize_phone).transpose()?;

        let updated = {
            let mut db = self.store.write().await;

            if let Some(email) = &email {
                if let Some(other) = db.find_participant_by_email(email) {
                    if other.id != id {
                        return Err(AppError::Conflict {
                            message: format!("A participant is already registered with {}", email),
                        });
                    }
                }
            }

            let participant = db.participant_mut(id)?;
            if let Some(first_name) = first_name {
                participant.first_name = first_name;
            }
            if let Some(last_name) = last_name {
                participant.last_name = last_name;
            }
            if let Some(email) = email {
                participant.email = email;
            }
            if let Some(phone) = phone {
                participant.phone = phone;
            }
            if let Some(is_member) = update.is_member {
                participant.is_member = is_member;
            }
            participant.updated_at = chrono::Utc::now();
            let updated = participant.clone();
            db.touch();
            updated
        };
        self.store.persist().await?;

        info!("Updated participant {}", id);
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<Participant> {
        let removed = {
            let mut db = self.store.write().await;
            db.remove_participant(id)?
        };
        self.store.persist().await?;

        info!("Deleted participant {} ({})", removed.full_name(), id);
        Ok(removed)
    }

    pub async fn dashboard_stats(&self) -> DashboardStats {
        let db = self.store.read().await;
        let mut stats = DashboardStats {
            participants: db.participants.len(),
            ..Default::default()
        };

        for participant in db.participants.values() {
            match db.display_status(participant.id) {
                DisplayStatus::Confirmed => stats.confirmed += 1,
                DisplayStatus::Pending => stats.pending += 1,
                DisplayStatus::Rejected => stats.rejected += 1,
                DisplayStatus::Unpaid => stats.unpaid += 1,
            }
            if participant.check_in_status {
                stats.checked_in += 1;
            }
            stats.confirmed_places += db.confirmed_places(participant.id).unwrap_or(0) as u64;
        }

        stats.pending_manual_payments = db
            .manual_payments
            .values()
            .filter(|m| m.status == ManualPaymentStatus::Pending)
            .count();
        stats.pending_memberships = db
            .memberships
            .values()
            .filter(|m| m.status == MembershipStatus::Pending)
            .count();

        let manual_revenue: u64 = db
            .manual_payments
            .values()
            .filter(|m| m.status == ManualPaymentStatus::Completed)
            .map(|m| m.amount)
            .sum();
        let gateway_revenue: u64 = db
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Success)
            .map(|p| p.amount)
            .sum();
        stats.revenue = manual_revenue + gateway_revenue;

        stats
    }

    /// Send an admin-written message to a set of participants.
    ///
    /// `{first_name}` in the body is replaced per recipient. Delivery
    /// failures are counted and logged, never fatal.
    pub async fn send_custom_email(&self, email: CustomEmail) -> Result<CustomEmailReport> {
        let subject = require_name(&email.subject, "Subject")?;
        let body = email.body.trim();
        if body.is_empty() {
            return Err(AppError::validation("Message body is required"));
        }

        let recipients: Vec<Participant> = {
            let db = self.store.read().await;
            match &email.recipients {
                RecipientSet::Selected(ids) => ids
                    .iter()
                    .map(|id| db.participant(*id).cloned())
                    .collect::<Result<_>>()?,
                set => db
                    .participants_sorted()
                    .into_iter()
                    .filter(|p| set.includes(db.display_status(p.id)))
                    .cloned()
                    .collect(),
            }
        };

        let mut report = CustomEmailReport::default();
        for participant in &recipients {
            let params = messages::custom_params(participant, &subject, body, &self.event);
            match self.notifications.dispatch(EmailEvent::Custom, params).await {
                None => report.sent += 1,
                Some(warning) => {
                    report.failed += 1;
                    report.warnings.push(warning);
                }
            }
        }

        info!(
            "Custom email \"{}\": {} sent, {} failed",
            subject, report.sent, report.failed
        );
        Ok(report)
    }
}

/// Who receives a custom admin message
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase", tag = "kind", content = "ids")]
pub enum RecipientSet {
    All,
    Confirmed,
    Pending,
    Unpaid,
    Selected(Vec<Uuid>),
}

impl RecipientSet {
    fn includes(&self, status: DisplayStatus) -> bool {
        match self {
            RecipientSet::All | RecipientSet::Selected(_) => true,
            RecipientSet::Confirmed => status == DisplayStatus::Confirmed,
            RecipientSet::Pending => status == DisplayStatus::Pending,
            RecipientSet::Unpaid => status == DisplayStatus::Unpaid,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomEmail {
    pub recipients: RecipientSet,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomEmailReport {
    pub sent: usize,
    pub failed: usize,
    pub warnings: Vec<String>,
}

pub type SharedRegistrationManager = Arc<RegistrationManager>;

pub fn create_shared_registration_manager(
    store: SharedRegistryStore,
    notifications: SharedNotificationManager,
    event: Arc<EventConfig>,
) -> SharedRegistrationManager {
    Arc::new(RegistrationManager::new(store, notifications, event))
}
