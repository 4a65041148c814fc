use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    AdminUser, CheckIn, DisplayStatus, Guest, ManualPayment, Membership, Notification,
    Participant, Payment,
};

const SCHEMA_VERSION: u32 = 2;

/// All registration tables, persisted together as one JSON document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDatabase {
    /// Schema version for migrations
    pub version: u32,

    /// Last update timestamp
    pub last_updated: chrono::DateTime<chrono::Utc>,

    #[serde(default)]
    pub participants: HashMap<Uuid, Participant>,
    #[serde(default)]
    pub payments: HashMap<Uuid, Payment>,
    #[serde(default)]
    pub manual_payments: HashMap<Uuid, ManualPayment>,
    #[serde(default)]
    pub guests: HashMap<Uuid, Guest>,
    #[serde(default)]
    pub memberships: HashMap<Uuid, Membership>,
    #[serde(default)]
    pub check_ins: HashMap<Uuid, CheckIn>,
    #[serde(default)]
    pub users: HashMap<Uuid, AdminUser>,
    #[serde(default)]
    pub notifications: HashMap<Uuid, Notification>,
}

impl Default for RegistryDatabase {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            last_updated: chrono::Utc::now(),
            participants: HashMap::new(),
            payments: HashMap::new(),
            manual_payments: HashMap::new(),
            guests: HashMap::new(),
            memberships: HashMap::new(),
            check_ins: HashMap::new(),
            users: HashMap::new(),
            notifications: HashMap::new(),
        }
    }
}

impl RegistryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file, or create new if not exists
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let mut db: RegistryDatabase =
                    serde_json::from_str(&content).map_err(|e| AppError::ConfigParse {
                        path: path.display().to_string(),
                        source: e,
                    })?;

                // Version 1 documents predate the notification log; the table
                // defaults to empty so only the version needs bumping.
                if db.version < SCHEMA_VERSION {
                    tracing::info!(
                        "Migrating registry database from version {} to {}",
                        db.version,
                        SCHEMA_VERSION
                    );
                    db.version = SCHEMA_VERSION;
                }

                Ok(db)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(AppError::StateLoad {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    /// Save to a JSON file atomically
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, &content).await
    }

    pub fn touch(&mut self) {
        self.last_updated = chrono::Utc::now();
    }

    // ========== Participants ==========

    pub fn participant(&self, id: Uuid) -> Result<&Participant> {
        self.participants
            .get(&id)
            .ok_or_else(|| AppError::not_found("Participant", id))
    }

    pub fn participant_mut(&mut self, id: Uuid) -> Result<&mut Participant> {
        self.participants
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Participant", id))
    }

    /// Case-insensitive email lookup
    pub fn find_participant_by_email(&self, email: &str) -> Option<&Participant> {
        let email = email.trim();
        self.participants
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email))
    }

    pub fn find_participant_by_qr(&self, qr_code_id: &str) -> Option<&Participant> {
        self.participants
            .values()
            .find(|p| p.qr_code_id.as_deref() == Some(qr_code_id))
    }

    /// Participants sorted by last name, then first name
    pub fn participants_sorted(&self) -> Vec<&Participant> {
        let mut list: Vec<_> = self.participants.values().collect();
        list.sort_by(|a, b| {
            a.last_name
                .to_lowercase()
                .cmp(&b.last_name.to_lowercase())
                .then_with(|| a.first_name.to_lowercase().cmp(&b.first_name.to_lowercase()))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        list
    }

    /// Remove a participant together with every row that references it
    pub fn remove_participant(&mut self, id: Uuid) -> Result<Participant> {
        let participant = self
            .participants
            .remove(&id)
            .ok_or_else(|| AppError::not_found("Participant", id))?;

        let manual_ids: Vec<Uuid> = self
            .manual_payments
            .values()
            .filter(|m| m.participant_id == id)
            .map(|m| m.id)
            .collect();
        self.guests
            .retain(|_, g| !manual_ids.contains(&g.manual_payment_id));
        self.manual_payments.retain(|_, m| m.participant_id != id);
        self.payments.retain(|_, p| p.participant_id != id);
        self.check_ins.retain(|_, c| c.participant_id != id);
        for membership in self.memberships.values_mut() {
            if membership.participant_id == Some(id) {
                membership.participant_id = None;
            }
        }

        self.touch();
        Ok(participant)
    }

    // ========== Payments ==========

    pub fn payments_for(&self, participant_id: Uuid) -> Vec<&Payment> {
        let mut list: Vec<_> = self
            .payments
            .values()
            .filter(|p| p.participant_id == participant_id)
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub fn manual_payments_for(&self, participant_id: Uuid) -> Vec<&ManualPayment> {
        let mut list: Vec<_> = self
            .manual_payments
            .values()
            .filter(|p| p.participant_id == participant_id)
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub fn find_payment_by_transaction(&self, transaction_id: &str) -> Option<&Payment> {
        self.payments
            .values()
            .find(|p| p.transaction_id == transaction_id)
    }

    /// Guests of a manual payment, main participant first
    pub fn guests_for(&self, manual_payment_id: Uuid) -> Vec<&Guest> {
        let mut list: Vec<_> = self
            .guests
            .values()
            .filter(|g| g.manual_payment_id == manual_payment_id)
            .collect();
        list.sort_by(|a, b| {
            b.is_main_participant
                .cmp(&a.is_main_participant)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.last_name.cmp(&b.last_name))
        });
        list
    }

    /// Payment status for display, deduplicated across both payment tables
    pub fn display_status(&self, participant_id: Uuid) -> DisplayStatus {
        let gateway = self
            .payments
            .values()
            .filter(|p| p.participant_id == participant_id)
            .map(|p| DisplayStatus::from_gateway(p.status));
        let manual = self
            .manual_payments
            .values()
            .filter(|p| p.participant_id == participant_id)
            .map(|p| DisplayStatus::from_manual(p.status));

        gateway.chain(manual).max().unwrap_or(DisplayStatus::Unpaid)
    }

    /// Places held by the confirmed payment, if any
    pub fn confirmed_places(&self, participant_id: Uuid) -> Option<u8> {
        let manual = self
            .manual_payments
            .values()
            .filter(|p| {
                p.participant_id == participant_id
                    && p.status == crate::models::ManualPaymentStatus::Completed
            })
            .map(|p| p.number_of_places);
        let gateway = self
            .payments
            .values()
            .filter(|p| {
                p.participant_id == participant_id
                    && p.status == crate::models::PaymentStatus::Success
            })
            .map(|p| p.number_of_places);
        manual.chain(gateway).max()
    }

    // ========== Admin users ==========

    pub fn find_admin_by_email(&self, email: &str) -> Option<&AdminUser> {
        let email = email.trim();
        self.users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }
}

/// Write to a temp file first, then rename for atomicity
async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, content)
        .await
        .map_err(|e| AppError::StateSave {
            path: path.display().to_string(),
            source: e,
        })?;

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| AppError::StateSave {
            path: path.display().to_string(),
            source: e,
        })?;

    Ok(())
}

/// Table store shared by every manager: the database plus where it lives on disk
pub struct RegistryStore {
    db: RwLock<RegistryDatabase>,
    path: Option<PathBuf>,
    /// One writer on the file at a time; the temp file name is shared
    save_lock: Mutex<()>,
}

impl RegistryStore {
    pub fn new(db: RegistryDatabase, path: Option<PathBuf>) -> Self {
        Self {
            db: RwLock::new(db),
            path,
            save_lock: Mutex::new(()),
        }
    }

    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        Self::new(RegistryDatabase::new(), None)
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, RegistryDatabase> {
        self.db.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, RegistryDatabase> {
        self.db.write().await
    }

    /// Write the current state to disk
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _saving = self.save_lock.lock().await;
        // Snapshot after taking the save lock so a later save never writes older state
        let content = serde_json::to_string_pretty(&*self.db.read().await)?;
        write_atomic(path, &content).await
    }

    /// Export as JSON bytes (for download), without admin credentials
    pub async fn export(&self) -> Result<Vec<u8>> {
        let mut document = serde_json::to_value(&*self.db.read().await)?;
        if let Some(tables) = document.as_object_mut() {
            tables.remove("users");
        }
        serde_json::to_vec_pretty(&document).map_err(|e| e.into())
    }
}

/// Shared table store type
pub type SharedRegistryStore = Arc<RegistryStore>;

pub fn create_shared_registry_store(db: RegistryDatabase, path: Option<PathBuf>) -> SharedRegistryStore {
    Arc::new(RegistryStore::new(db, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ManualPaymentMethod, ManualPaymentStatus, PaymentStatus,
    };
    use chrono::Utc;

    fn manual(participant_id: Uuid, status: ManualPaymentStatus) -> ManualPayment {
        ManualPayment {
            id: Uuid::new_v4(),
            participant_id,
            amount: 5000,
            method: ManualPaymentMethod::Wave,
            phone_number: "0700000000".to_string(),
            comment: None,
            number_of_places: 1,
            status,
            validated_by: None,
            validated_at: None,
            rejection_reason: None,
            created_at: Utc::now(),
        }
    }

    fn gateway(participant_id: Uuid, status: PaymentStatus) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            participant_id,
            amount: 5000,
            currency: "XOF".to_string(),
            method: "gateway".to_string(),
            status,
            transaction_id: Uuid::new_v4().to_string(),
            payment_url: None,
            number_of_places: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn participant(email: &str) -> Participant {
        Participant::new(
            "Awa".to_string(),
            "Traore".to_string(),
            email.to_string(),
            "0700000000".to_string(),
            false,
        )
    }

    #[test]
    fn test_display_status_unpaid_without_payments() {
        let mut db = RegistryDatabase::new();
        let p = participant("awa@example.com");
        let id = p.id;
        db.participants.insert(id, p);

        assert_eq!(db.display_status(id), DisplayStatus::Unpaid);
        assert!(db.display_status(id).badge().is_none());
    }

    #[test]
    fn test_display_status_prefers_confirmed() {
        let mut db = RegistryDatabase::new();
        let p = participant("awa@example.com");
        let id = p.id;
        db.participants.insert(id, p);

        let rejected = manual(id, ManualPaymentStatus::Rejected);
        db.manual_payments.insert(rejected.id, rejected);
        assert_eq!(db.display_status(id), DisplayStatus::Rejected);

        let pending = gateway(id, PaymentStatus::Pending);
        db.payments.insert(pending.id, pending);
        assert_eq!(db.display_status(id), DisplayStatus::Pending);

        let ok = gateway(id, PaymentStatus::Success);
        db.payments.insert(ok.id, ok);
        assert_eq!(db.display_status(id), DisplayStatus::Confirmed);
        assert_eq!(db.confirmed_places(id), Some(2));
    }

    #[test]
    fn test_remove_participant_cascades() {
        let mut db = RegistryDatabase::new();
        let p = participant("awa@example.com");
        let id = p.id;
        db.participants.insert(id, p);

        let m = manual(id, ManualPaymentStatus::Pending);
        let guest = Guest {
            id: Uuid::new_v4(),
            manual_payment_id: m.id,
            first_name: "Awa".to_string(),
            last_name: "Traore".to_string(),
            is_main_participant: true,
            created_at: Utc::now(),
        };
        db.guests.insert(guest.id, guest);
        db.manual_payments.insert(m.id, m);

        db.remove_participant(id).unwrap();
        assert!(db.participants.is_empty());
        assert!(db.manual_payments.is_empty());
        assert!(db.guests.is_empty());
        assert!(db.remove_participant(id).is_err());
    }

    #[test]
    fn test_email_lookup_is_case_insensitive() {
        let mut db = RegistryDatabase::new();
        let p = participant("Awa@Example.com");
        db.participants.insert(p.id, p);

        assert!(db.find_participant_by_email(" awa@example.COM ").is_some());
        assert!(db.find_participant_by_email("other@example.com").is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let mut db = RegistryDatabase::new();
        let p = participant("awa@example.com");
        let id = p.id;
        db.participants.insert(id, p);
        db.save(&path).await.unwrap();

        let loaded = RegistryDatabase::load(&path).await.unwrap();
        assert_eq!(loaded.participants.len(), 1);
        assert_eq!(loaded.participant(id).unwrap().email, "awa@example.com");
    }

    #[tokio::test]
    async fn test_load_missing_file_gives_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = RegistryDatabase::load(&dir.path().join("missing.json"))
            .await
            .unwrap();
        assert!(db.participants.is_empty());
        assert_eq!(db.version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_load_migrates_old_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        tokio::fs::write(
            &path,
            r#"{"version": 1, "last_updated": "2025-11-02T09:00:00Z", "participants": {}}"#,
        )
        .await
        .unwrap();

        let db = RegistryDatabase::load(&path).await.unwrap();
        assert_eq!(db.version, SCHEMA_VERSION);
        assert!(db.notifications.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_persists_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let store = create_shared_registry_store(RegistryDatabase::new(), Some(path.clone()));

        let tasks: Vec<_> = (0..100)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    {
                        let mut db = store.write().await;
                        let p = participant(&format!("guest{}@example.com", i));
                        db.participants.insert(p.id, p);
                        db.touch();
                    }
                    store.persist().await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let loaded = RegistryDatabase::load(&path).await.unwrap();
        assert_eq!(loaded.participants.len(), 100);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_export_leaves_out_admin_accounts() {
        let store = RegistryStore::in_memory();
        {
            let mut db = store.write().await;
            let admin = AdminUser {
                id: Uuid::new_v4(),
                email: "admin@example.com".to_string(),
                display_name: "Admin".to_string(),
                password_hash: "abcdef".to_string(),
                salt: "0123".to_string(),
                created_at: Utc::now(),
                last_login_at: None,
            };
            db.users.insert(admin.id, admin);
            let p = participant("awa@example.com");
            db.participants.insert(p.id, p);
        }

        let exported: serde_json::Value = serde_json::from_slice(&store.export().await.unwrap()).unwrap();
        assert!(exported.get("users").is_none());
        assert_eq!(exported["participants"].as_object().unwrap().len(), 1);
        let text = exported.to_string();
        assert!(!text.contains("password_hash"));
        assert!(!text.contains("admin@example.com"));
    }
}
