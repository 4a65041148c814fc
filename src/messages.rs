// src/messages.rs
//! Outbound email events and the template parameters each one carries.

use serde_json::{json, Map, Value};

use crate::config::{EmailTemplates, EventConfig};
use crate::models::{Guest, ManualPayment, Membership, Participant};

/// Internal events that trigger an outbound email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailEvent {
    Registration,
    PaymentPending,
    AdminPayment,
    PaymentConfirmed,
    PaymentRejected,
    MembershipRequest,
    AdminMembership,
    MembershipApproved,
    MembershipRejected,
    Custom,
}

impl EmailEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailEvent::Registration => "registration",
            EmailEvent::PaymentPending => "payment_pending",
            EmailEvent::AdminPayment => "admin_payment",
            EmailEvent::PaymentConfirmed => "payment_confirmed",
            EmailEvent::PaymentRejected => "payment_rejected",
            EmailEvent::MembershipRequest => "membership_request",
            EmailEvent::AdminMembership => "admin_membership",
            EmailEvent::MembershipApproved => "membership_approved",
            EmailEvent::MembershipRejected => "membership_rejected",
            EmailEvent::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "registration" => EmailEvent::Registration,
            "payment_pending" => EmailEvent::PaymentPending,
            "admin_payment" => EmailEvent::AdminPayment,
            "payment_confirmed" => EmailEvent::PaymentConfirmed,
            "payment_rejected" => EmailEvent::PaymentRejected,
            "membership_request" => EmailEvent::MembershipRequest,
            "admin_membership" => EmailEvent::AdminMembership,
            "membership_approved" => EmailEvent::MembershipApproved,
            "membership_rejected" => EmailEvent::MembershipRejected,
            "custom" => EmailEvent::Custom,
            _ => return None,
        })
    }

    pub fn template<'a>(&self, templates: &'a EmailTemplates) -> &'a str {
        match self {
            EmailEvent::Registration => &templates.registration,
            EmailEvent::PaymentPending => &templates.payment_pending,
            EmailEvent::AdminPayment => &templates.admin_payment,
            EmailEvent::PaymentConfirmed => &templates.payment_confirmed,
            EmailEvent::PaymentRejected => &templates.payment_rejected,
            EmailEvent::MembershipRequest => &templates.membership_request,
            EmailEvent::AdminMembership => &templates.admin_membership,
            EmailEvent::MembershipApproved => &templates.membership_approved,
            EmailEvent::MembershipRejected => &templates.membership_rejected,
            EmailEvent::Custom => &templates.custom,
        }
    }
}

fn base_params(to_name: &str, to_email: &str, subject: String, message: String, event: &EventConfig) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("to_name".to_string(), json!(to_name));
    params.insert("to_email".to_string(), json!(to_email));
    params.insert("subject".to_string(), json!(subject));
    params.insert("message".to_string(), json!(message));
    params.insert("event_name".to_string(), json!(event.event_name));
    params
}

fn format_amount(amount: u64, event: &EventConfig) -> String {
    format!("{} {}", amount, event.currency)
}

pub fn registration_params(participant: &Participant, event: &EventConfig) -> Map<String, Value> {
    let message = format!(
        "Hello {},\n\n\
        Your registration for {} has been received.\n\
        To secure your place, complete your payment from your participant page:\n\
        {}/pending/{}\n\n\
        See you soon!",
        participant.first_name, event.event_name, event.public_base_url, participant.id
    );
    base_params(
        &participant.full_name(),
        &participant.email,
        format!("Registration received - {}", event.event_name),
        message,
        event,
    )
}

fn guest_list(guests: &[&Guest]) -> String {
    guests
        .iter()
        .map(|g| format!("- {} {}", g.first_name, g.last_name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn payment_pending_params(
    participant: &Participant,
    payment: &ManualPayment,
    guests: &[&Guest],
    event: &EventConfig,
) -> Map<String, Value> {
    let message = format!(
        "Hello {},\n\n\
        We received your {} payment declaration of {} for {} place(s).\n\
        An administrator will check it shortly; you will receive your QR code by email once it is validated.\n\n\
        Registered guests:\n{}",
        participant.first_name,
        payment.method.label(),
        format_amount(payment.amount, event),
        payment.number_of_places,
        guest_list(guests)
    );
    let mut params = base_params(
        &participant.full_name(),
        &participant.email,
        format!("Payment received - {}", event.event_name),
        message,
        event,
    );
    params.insert("amount".to_string(), json!(payment.amount));
    params.insert("number_of_places".to_string(), json!(payment.number_of_places));
    params
}

pub fn admin_payment_params(
    participant: &Participant,
    payment: &ManualPayment,
    guests: &[&Guest],
    event: &EventConfig,
) -> Map<String, Value> {
    let message = format!(
        "New manual payment to validate.\n\n\
        Participant: {} ({}, {})\n\
        Method: {}\n\
        Payer phone: {}\n\
        Amount: {}\n\
        Places: {}\n\
        Comment: {}\n\n\
        Guests:\n{}\n\n\
        Review it at {}/admin/payments",
        participant.full_name(),
        participant.email,
        participant.phone,
        payment.method.label(),
        payment.phone_number,
        format_amount(payment.amount, event),
        payment.number_of_places,
        payment.comment.as_deref().unwrap_or("-"),
        guest_list(guests),
        event.public_base_url
    );
    let mut params = base_params(
        "Admin",
        &event.admin_email,
        format!("New manual payment: {}", participant.full_name()),
        message,
        event,
    );
    params.insert("payment_id".to_string(), json!(payment.id.to_string()));
    params
}

pub fn payment_confirmed_params(
    participant: &Participant,
    qr_code_id: &str,
    places: u8,
    event: &EventConfig,
) -> Map<String, Value> {
    let qr_url = event.qr_image_url(qr_code_id);
    let message = format!(
        "Hello {},\n\n\
        Your payment for {} is confirmed ({} place(s)).\n\
        Present this QR code at the entrance: {}\n\n\
        Ticket reference: {}",
        participant.first_name, event.event_name, places, qr_url, qr_code_id
    );
    let mut params = base_params(
        &participant.full_name(),
        &participant.email,
        format!("Your ticket for {}", event.event_name),
        message,
        event,
    );
    params.insert("qr_code_id".to_string(), json!(qr_code_id));
    params.insert("qr_code_url".to_string(), json!(qr_url));
    params.insert("number_of_places".to_string(), json!(places));
    params
}

pub fn payment_rejected_params(
    participant: &Participant,
    reason: Option<&str>,
    event: &EventConfig,
) -> Map<String, Value> {
    let message = format!(
        "Hello {},\n\n\
        We could not validate your payment for {}.\n\
        Reason: {}\n\n\
        You can submit a new payment from {}/pending/{} or contact the organisers.",
        participant.first_name,
        event.event_name,
        reason.unwrap_or("not specified"),
        event.public_base_url,
        participant.id
    );
    let mut params = base_params(
        &participant.full_name(),
        &participant.email,
        format!("Payment not validated - {}", event.event_name),
        message,
        event,
    );
    params.insert("reason".to_string(), json!(reason.unwrap_or_default()));
    params
}

fn membership_name(membership: &Membership) -> String {
    format!("{} {}", membership.first_name, membership.last_name)
}

pub fn membership_request_params(membership: &Membership, event: &EventConfig) -> Map<String, Value> {
    let message = format!(
        "Hello {},\n\n\
        Your membership request has been received and will be reviewed by the board.",
        membership.first_name
    );
    base_params(
        &membership_name(membership),
        &membership.email,
        "Membership request received".to_string(),
        message,
        event,
    )
}

pub fn admin_membership_params(membership: &Membership, event: &EventConfig) -> Map<String, Value> {
    let message = format!(
        "New membership request.\n\n\
        Name: {}\n\
        Email: {}\n\
        Phone: {}\n\
        Type: {:?}\n\n\
        Review it at {}/admin/memberships",
        membership_name(membership),
        membership.email,
        membership.phone,
        membership.membership_type,
        event.public_base_url
    );
    let mut params = base_params(
        "Admin",
        &event.admin_email,
        format!("New membership request: {}", membership_name(membership)),
        message,
        event,
    );
    params.insert("membership_id".to_string(), json!(membership.id.to_string()));
    params
}

pub fn membership_approved_params(membership: &Membership, event: &EventConfig) -> Map<String, Value> {
    let message = format!(
        "Hello {},\n\nWelcome! Your membership request has been approved.",
        membership.first_name
    );
    base_params(
        &membership_name(membership),
        &membership.email,
        "Membership approved".to_string(),
        message,
        event,
    )
}

pub fn membership_rejected_params(
    membership: &Membership,
    reason: Option<&str>,
    event: &EventConfig,
) -> Map<String, Value> {
    let message = format!(
        "Hello {},\n\n\
        Unfortunately your membership request was not approved.\n\
        Reason: {}",
        membership.first_name,
        reason.unwrap_or("not specified")
    );
    let mut params = base_params(
        &membership_name(membership),
        &membership.email,
        "Membership request".to_string(),
        message,
        event,
    );
    params.insert("reason".to_string(), json!(reason.unwrap_or_default()));
    params
}

pub fn custom_params(
    participant: &Participant,
    subject: &str,
    body: &str,
    event: &EventConfig,
) -> Map<String, Value> {
    base_params(
        &participant.full_name(),
        &participant.email,
        subject.to_string(),
        body.replace("{first_name}", &participant.first_name),
        event,
    )
}
