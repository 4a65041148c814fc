use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{CheckIn, CheckInMethod, DisplayStatus, Participant};
use crate::state::{RegistryDatabase, SharedRegistryStore};

#[derive(Debug, Clone, Serialize)]
pub struct CheckInOutcome {
    pub participant: Participant,
    pub check_in: CheckIn,
    pub places: Option<u8>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CheckInStats {
    pub confirmed: usize,
    pub checked_in: usize,
    pub remaining: usize,
}

/// Entrance check-in by QR scan or by hand
pub struct CheckInManager {
    store: SharedRegistryStore,
}

impl CheckInManager {
    pub fn new(store: SharedRegistryStore) -> Self {
        Self { store }
    }

    /// Check in the holder of a scanned QR code
    pub async fn scan(&self, qr_code_id: &str, admin: &str) -> Result<CheckInOutcome> {
        let qr_code_id = qr_code_id.trim();
        let outcome = {
            let mut db = self.store.write().await;
            let participant_id = db
                .find_participant_by_qr(qr_code_id)
                .map(|p| p.id)
                .ok_or_else(|| AppError::not_found("QR code", qr_code_id))?;
            record_check_in(&mut db, participant_id, admin, CheckInMethod::QrScan)?
        };
        self.store.persist().await?;

        info!(
            "Checked in {} by QR scan ({})",
            outcome.participant.full_name(),
            qr_code_id
        );
        Ok(outcome)
    }

    /// Check in without a QR code; the participant must hold a confirmed payment
    pub async fn manual_check_in(&self, participant_id: Uuid, admin: &str) -> Result<CheckInOutcome> {
        let outcome = {
            let mut db = self.store.write().await;
            let status = db.display_status(participant_id);
            db.participant(participant_id)?;
            if status != DisplayStatus::Confirmed {
                return Err(AppError::validation(format!(
                    "Participant has no confirmed payment (status: {})",
                    status.as_str()
                )));
            }
            record_check_in(&mut db, participant_id, admin, CheckInMethod::Manual)?
        };
        self.store.persist().await?;

        info!("Checked in {} manually", outcome.participant.full_name());
        Ok(outcome)
    }

    pub async fn undo_check_in(&self, participant_id: Uuid) -> Result<Participant> {
        let participant = {
            let mut db = self.store.write().await;
            let participant = db.participant_mut(participant_id)?;
            participant.check_in_status = false;
            participant.checked_in_at = None;
            participant.updated_at = chrono::Utc::now();
            let participant = participant.clone();
            db.check_ins.retain(|_, c| c.participant_id != participant_id);
            db.touch();
            participant
        };
        self.store.persist().await?;

        info!("Check-in cancelled for {}", participant.full_name());
        Ok(participant)
    }

    pub async fn stats(&self) -> CheckInStats {
        let db = self.store.read().await;
        let confirmed: Vec<_> = db
            .participants
            .values()
            .filter(|p| db.display_status(p.id) == DisplayStatus::Confirmed)
            .collect();
        let checked_in = confirmed.iter().filter(|p| p.check_in_status).count();
        CheckInStats {
            confirmed: confirmed.len(),
            checked_in,
            remaining: confirmed.len() - checked_in,
        }
    }
}

fn record_check_in(
    db: &mut RegistryDatabase,
    participant_id: Uuid,
    admin: &str,
    method: CheckInMethod,
) -> Result<CheckInOutcome> {
    let now = chrono::Utc::now();
    let places = db.confirmed_places(participant_id);
    let participant = db.participant_mut(participant_id)?;

    if participant.check_in_status {
        return Err(AppError::AlreadyCheckedIn {
            name: participant.full_name(),
            at: participant.checked_in_at.unwrap_or(now),
        });
    }

    participant.check_in_status = true;
    participant.checked_in_at = Some(now);
    participant.updated_at = now;
    let participant = participant.clone();

    let check_in = CheckIn {
        id: Uuid::new_v4(),
        participant_id,
        checked_in_at: now,
        checked_in_by: admin.to_string(),
        method,
    };
    db.check_ins.insert(check_in.id, check_in.clone());
    db.touch();

    Ok(CheckInOutcome {
        participant,
        check_in,
        places,
    })
}

pub type SharedCheckInManager = Arc<CheckInManager>;

pub fn create_shared_checkin_manager(store: SharedRegistryStore) -> SharedCheckInManager {
    Arc::new(CheckInManager::new(store))
}
