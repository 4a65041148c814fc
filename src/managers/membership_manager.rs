use futures::future::join;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::notification_manager::SharedNotificationManager;
use crate::config::EventConfig;
use crate::error::{AppError, Result};
use crate::messages::{self, EmailEvent};
use crate::models::{Membership, MembershipStatus, MembershipType};
use crate::state::SharedRegistryStore;
use crate::validation::{normalize_email, normalize_phone, optional_text, require_name};

#[derive(Debug, Clone, Deserialize)]
pub struct MembershipRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub membership_type: MembershipType,
}

#[derive(Debug, Clone, Serialize)]
pub struct MembershipOutcome {
    pub membership: Membership,
    pub warnings: Vec<String>,
}

/// Membership requests: pending, then approved or rejected once
pub struct MembershipManager {
    store: SharedRegistryStore,
    notifications: SharedNotificationManager,
    event: Arc<EventConfig>,
}

impl MembershipManager {
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

    pub async fn request(&self, form: MembershipRequest) -> Result<MembershipOutcome> {
        let membership = Membership {
            id: Uuid::new_v4(),
            first_name: require_name(&form.first_name, "First name")?,
            last_name: require_name(&form.last_name, "Last name")?,
            email: normalize_email(&form.email)?,
            phone: normalize_phone(&form.phone)?,
            membership_type: form.membership_type,
            status: MembershipStatus::Pending,
            participant_id: None,
            processed_by: None,
            processed_at: None,
            rejection_reason: None,
            created_at: chrono::Utc::now(),
        };

        {
            let mut db = self.store.write().await;
            let duplicate = db.memberships.values().any(|m| {
                m.status == MembershipStatus::Pending && m.email == membership.email
            });
            if duplicate {
                return Err(AppError::Conflict {
                    message: format!("A membership request for {} is already pending", membership.email),
                });
            }
            db.memberships.insert(membership.id, membership.clone());
            db.touch();
        }
        self.store.persist().await?;

        info!("Membership request {} from {}", membership.id, membership.email);

        let (ack, admin) = join(
            self.notifications.dispatch(
                EmailEvent::MembershipRequest,
                messages::membership_request_params(&membership, &self.event),
            ),
            self.notifications.dispatch(
                EmailEvent::AdminMembership,
                messages::admin_membership_params(&membership, &self.event),
            ),
        )
        .await;

        Ok(MembershipOutcome {
            membership,
            warnings: ack.into_iter().chain(admin).collect(),
        })
    }

    pub async fn list(&self, status: Option<MembershipStatus>) -> Vec<Membership> {
        let db = self.store.read().await;
        let mut list: Vec<_> = db
            .memberships
            .values()
            .filter(|m| status.map_or(true, |s| m.status == s))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    /// Approve a pending request; a participant with the same email becomes a member
    pub async fn approve(&self, id: Uuid, admin: &str) -> Result<MembershipOutcome> {
        let membership = {
            let mut db = self.store.write().await;
            let linked = db.find_participant_by_email(&self.email_of(&db, id)?).map(|p| p.id);

            let membership = db
                .memberships
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found("Membership", id))?;
            ensure_pending(membership, "approve")?;

            membership.status = MembershipStatus::Approved;
            membership.processed_by = Some(admin.to_string());
            membership.processed_at = Some(chrono::Utc::now());
            membership.participant_id = linked;
            let membership = membership.clone();

            if let Some(participant_id) = linked {
                let participant = db.participant_mut(participant_id)?;
                participant.is_member = true;
                participant.updated_at = chrono::Utc::now();
                info!("Participant {} marked as member", participant_id);
            }
            db.touch();
            membership
        };
        self.store.persist().await?;

        info!("Membership {} approved by {}", id, admin);

        let warnings = self
            .notifications
            .dispatch(
                EmailEvent::MembershipApproved,
                messages::membership_approved_params(&membership, &self.event),
            )
            .await
            .into_iter()
            .collect();

        Ok(MembershipOutcome { membership, warnings })
    }

    pub async fn reject(&self, id: Uuid, admin: &str, reason: Option<&str>) -> Result<MembershipOutcome> {
        let reason = optional_text(reason);
        let membership = {
            let mut db = self.store.write().await;
            let membership = db
                .memberships
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found("Membership", id))?;
            ensure_pending(membership, "reject")?;

            membership.status = MembershipStatus::Rejected;
            membership.processed_by = Some(admin.to_string());
            membership.processed_at = Some(chrono::Utc::now());
            membership.rejection_reason = reason.clone();
            let membership = membership.clone();
            db.touch();
            membership
        };
        self.store.persist().await?;

        info!("Membership {} rejected by {}", id, admin);

        let warnings = self
            .notifications
            .dispatch(
                EmailEvent::MembershipRejected,
                messages::membership_rejected_params(&membership, reason.as_deref(), &self.event),
            )
            .await
            .into_iter()
            .collect();

        Ok(MembershipOutcome { membership, warnings })
    }

    fn email_of(&self, db: &crate::state::RegistryDatabase, id: Uuid) -> Result<String> {
        db.memberships
            .get(&id)
            .map(|m| m.email.clone())
            .ok_or_else(|| AppError::not_found("Membership", id))
    }
}

fn ensure_pending(membership: &Membership, action: &'static str) -> Result<()> {
    if membership.status != MembershipStatus::Pending {
        return Err(AppError::InvalidTransition {
            entity: "membership",
            action,
            status: membership.status.as_str().to_string(),
        });
    }
    Ok(())
}

pub type SharedMembershipManager = Arc<MembershipManager>;

pub fn create_shared_membership_manager(
    store: SharedRegistryStore,
    notifications: SharedNotificationManager,
    event: Arc<EventConfig>,
) -> SharedMembershipManager {
    Arc::new(MembershipManager::new(store, notifications, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::testing::Fixture;

    fn request(email: &str) -> MembershipRequest {
        MembershipRequest {
            first_name: "Awa".to_string(),
            last_name: "Traore".to_string(),
            email: email.to_string(),
            phone: "0701020304".to_string(),
            membership_type: MembershipType::Individual,
        }
    }

    #[tokio::test]
    async fn test_request_creates_pending_and_notifies() {
        let fx = Fixture::new();
        let outcome = fx.memberships.request(request("awa@example.com")).await.unwrap();

        assert_eq!(outcome.membership.status, MembershipStatus::Pending);
        assert_eq!(fx.mailer.sent_to("awa@example.com").len(), 1);
        assert_eq!(fx.mailer.sent_to("admin@example.com").len(), 1);

        let again = fx.memberships.request(request("AWA@example.com")).await;
        assert!(matches!(again, Err(AppError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_approval_links_participant_by_email() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        assert!(!participant.is_member);

        let outcome = fx.memberships.request(request("Awa@Example.com")).await.unwrap();
        let approved = fx.memberships.approve(outcome.membership.id, "admin").await.unwrap();

        assert_eq!(approved.membership.status, MembershipStatus::Approved);
        assert_eq!(approved.membership.participant_id, Some(participant.id));
        let db = fx.store.read().await;
        assert!(db.participant(participant.id).unwrap().is_member);
    }

    #[tokio::test]
    async fn test_approval_without_matching_participant() {
        let fx = Fixture::new();
        let outcome = fx.memberships.request(request("nobody@example.com")).await.unwrap();
        let approved = fx.memberships.approve(outcome.membership.id, "admin").await.unwrap();
        assert_eq!(approved.membership.participant_id, None);
    }

    #[tokio::test]
    async fn test_single_transition_only() {
        let fx = Fixture::new();
        let outcome = fx.memberships.request(request("awa@example.com")).await.unwrap();
        let id = outcome.membership.id;

        let rejected = fx.memberships.reject(id, "admin", Some("Incomplete file")).await.unwrap();
        assert_eq!(rejected.membership.rejection_reason.as_deref(), Some("Incomplete file"));

        assert!(matches!(
            fx.memberships.approve(id, "admin").await,
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(matches!(
            fx.memberships.reject(id, "admin", None).await,
            Err(AppError::InvalidTransition { .. })
        ));
        assert_eq!(fx.memberships.list(Some(MembershipStatus::Pending)).await.len(), 0);
        assert_eq!(fx.memberships.list(None).await.len(), 1);
    }
}
