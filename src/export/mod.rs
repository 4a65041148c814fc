//! Admin exports: participant and payment tables as CSV or a printable layout.

pub mod csv;
pub mod print;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::DisplayStatus;
use crate::state::RegistryDatabase;

pub use self::csv::{participants_csv, payments_csv};
pub use self::print::{html_escape, paginate, render_print_html, PagedTable, TablePage};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantRow {
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub phone: String,
    pub is_member: bool,
    pub payment_status: DisplayStatus,
    pub places: Option<u8>,
    pub checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub qr_code_id: Option<String>,
}

impl ParticipantRow {
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.last_name.clone(),
            self.first_name.clone(),
            self.email.clone(),
            self.phone.clone(),
            yes_no(self.is_member),
            self.payment_status.as_str().to_string(),
            self.places.map(|p| p.to_string()).unwrap_or_default(),
            yes_no(self.checked_in),
            format_time(self.checked_in_at),
            self.qr_code_id.clone().unwrap_or_default(),
        ]
    }
}

/// Where a payment row came from
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentSource {
    Gateway,
    Manual,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRow {
    pub date: DateTime<Utc>,
    pub participant: String,
    pub email: String,
    pub source: PaymentSource,
    pub method: String,
    pub amount: u64,
    pub places: u8,
    pub status: String,
    pub validated_by: Option<String>,
}

impl PaymentRow {
    pub fn cells(&self) -> Vec<String> {
        vec![
            format_time(Some(self.date)),
            self.participant.clone(),
            self.email.clone(),
            match self.source {
                PaymentSource::Gateway => "Online".to_string(),
                PaymentSource::Manual => "Manual".to_string(),
            },
            self.method.clone(),
            self.amount.to_string(),
            self.places.to_string(),
            self.status.clone(),
            self.validated_by.clone().unwrap_or_default(),
        ]
    }
}

fn yes_no(value: bool) -> String {
    if value { "Yes" } else { "No" }.to_string()
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format(DATE_FORMAT).to_string()).unwrap_or_default()
}

/// One row per participant, ordered by last then first name
pub fn participant_rows(db: &RegistryDatabase) -> Vec<ParticipantRow> {
    db.participants_sorted()
        .into_iter()
        .map(|p| ParticipantRow {
            last_name: p.last_name.clone(),
            first_name: p.first_name.clone(),
            email: p.email.clone(),
            phone: p.phone.clone(),
            is_member: p.is_member,
            payment_status: db.display_status(p.id),
            places: db.confirmed_places(p.id),
            checked_in: p.check_in_status,
            checked_in_at: p.checked_in_at,
            qr_code_id: p.qr_code_id.clone(),
        })
        .collect()
}

/// Gateway and manual payments merged, newest first
pub fn payment_rows(db: &RegistryDatabase) -> Vec<PaymentRow> {
    let owner = |id: uuid::Uuid| {
        db.participants
            .get(&id)
            .map(|p| (p.full_name(), p.email.clone()))
            .unwrap_or_default()
    };

    let gateway = db.payments.values().map(|p| {
        let (participant, email) = owner(p.participant_id);
        PaymentRow {
            date: p.created_at,
            participant,
            email,
            source: PaymentSource::Gateway,
            method: p.method.clone(),
            amount: p.amount,
            places: p.number_of_places,
            status: DisplayStatus::from_gateway(p.status).as_str().to_string(),
            validated_by: None,
        }
    });
    let manual = db.manual_payments.values().map(|m| {
        let (participant, email) = owner(m.participant_id);
        PaymentRow {
            date: m.created_at,
            participant,
            email,
            source: PaymentSource::Manual,
            method: m.method.label().to_string(),
            amount: m.amount,
            places: m.number_of_places,
            status: DisplayStatus::from_manual(m.status).as_str().to_string(),
            validated_by: m.validated_by.clone(),
        }
    });

    let mut rows: Vec<_> = gateway.chain(manual).collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date));
    rows
}
