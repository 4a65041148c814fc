// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered event participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub is_member: bool,
    #[serde(default)]
    pub check_in_status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_in_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(first_name: String, last_name: String, email: String, phone: String, is_member: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            first_name,
            last_name,
            email,
            phone,
            is_member,
            check_in_status: false,
            checked_in_at: None,
            qr_code_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Status of a gateway-processed payment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

/// A payment initiated through the hosted checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub amount: u64,
    pub currency: String,
    pub method: String,
    pub status: PaymentStatus,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    pub number_of_places: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Channel the payer used for a manual payment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ManualPaymentMethod {
    Wave,
    OrangeMoney,
    MtnMoney,
    MoovMoney,
    Cash,
    BankTransfer,
}

impl ManualPaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            ManualPaymentMethod::Wave => "Wave",
            ManualPaymentMethod::OrangeMoney => "Orange Money",
            ManualPaymentMethod::MtnMoney => "MTN Money",
            ManualPaymentMethod::MoovMoney => "Moov Money",
            ManualPaymentMethod::Cash => "Cash",
            ManualPaymentMethod::BankTransfer => "Bank transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ManualPaymentStatus {
    Pending,
    Completed,
    Rejected,
}

impl ManualPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManualPaymentStatus::Pending => "pending",
            ManualPaymentStatus::Completed => "completed",
            ManualPaymentStatus::Rejected => "rejected",
        }
    }
}

/// A payment reported by the payer, confirmed by an admin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualPayment {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub amount: u64,
    pub method: ManualPaymentMethod,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub number_of_places: u8,
    pub status: ManualPaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A named place attached to a manual payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guest {
    pub id: Uuid,
    pub manual_payment_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub is_main_participant: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    Individual,
    Family,
    Student,
    Honorary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Approved,
    Rejected,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Approved => "approved",
            MembershipStatus::Rejected => "rejected",
        }
    }
}

/// A club membership request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub membership_type: MembershipType,
    pub status: MembershipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckInMethod {
    QrScan,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub checked_in_at: DateTime<Utc>,
    pub checked_in_by: String,
    pub method: CheckInMethod,
}

/// Administrator account (the `users` table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub salt: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
    Failed,
}

/// One outbound email attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub event: String,
    pub recipient: String,
    pub template_id: String,
    pub params: serde_json::Map<String, serde_json::Value>,
    pub status: NotificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

/// Payment status as shown to admins and participants.
///
/// Computed from every payment row of a participant, preferring confirmed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Unpaid,
    Rejected,
    Pending,
    Confirmed,
}

impl DisplayStatus {
    /// Badge label; unpaid participants get a "pay now" affordance instead
    pub fn badge(&self) -> Option<&'static str> {
        match self {
            DisplayStatus::Confirmed => Some("Confirmed"),
            DisplayStatus::Pending => Some("Pending"),
            DisplayStatus::Rejected => Some("Rejected"),
            DisplayStatus::Unpaid => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayStatus::Confirmed => "confirmed",
            DisplayStatus::Pending => "pending",
            DisplayStatus::Rejected => "rejected",
            DisplayStatus::Unpaid => "unpaid",
        }
    }

    pub fn from_manual(status: ManualPaymentStatus) -> Self {
        match status {
            ManualPaymentStatus::Completed => DisplayStatus::Confirmed,
            ManualPaymentStatus::Pending => DisplayStatus::Pending,
            ManualPaymentStatus::Rejected => DisplayStatus::Rejected,
        }
    }

    pub fn from_gateway(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Success => DisplayStatus::Confirmed,
            PaymentStatus::Pending => DisplayStatus::Pending,
            PaymentStatus::Failed => DisplayStatus::Rejected,
        }
    }
}
