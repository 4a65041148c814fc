//! Admin panel routes and handlers
//!
//! Server-rendered pages for the dashboard, payment validation, memberships,
//! entrance scanning, email and live logs. Actions go through the JSON routes
//! under `/admin/api`, which answer 401 instead of redirecting.

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Redirect, Response,
    },
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::info;
use uuid::Uuid;

use super::auth::{
    authenticate, create_logout_cookie, create_session_cookie, get_session_token, login_page, AdminSession,
};
use super::html_escape;
use super::server::AppState;
use crate::error::{AppError, Result};
use crate::export::{self, print::DEFAULT_ROWS_PER_PAGE};
use crate::managers::checkin_manager::{CheckInOutcome, CheckInStats};
use crate::managers::gateway_manager::Reconciliation;
use crate::managers::membership_manager::MembershipOutcome;
use crate::managers::payment_manager::{ManualPaymentView, RejectionOutcome, ValidationOutcome};
use crate::managers::registration_manager::{
    CustomEmail, CustomEmailReport, DashboardStats, ParticipantDetail, ParticipantSummary, ParticipantUpdate,
};
use crate::models::{
    DisplayStatus, ManualPaymentStatus, Membership, MembershipStatus, Notification, NotificationStatus, Participant,
};

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .route("/payments", get(payments_page))
        .route("/memberships", get(memberships_page))
        .route("/scan", get(scan_page))
        .route("/email", get(email_page))
        .route("/logs", get(logs_page))
        .route("/logs/stream", get(logs_stream))
        .route("/export/participants.csv", get(export_participants_csv))
        .route("/export/payments.csv", get(export_payments_csv))
        .route("/export/participants/print", get(print_participants))
        .route("/export/payments/print", get(print_payments))
        .route("/export/database.json", get(export_database))
        .route("/api/stats", get(stats))
        .route("/api/participants", get(list_participants))
        .route(
            "/api/participants/:id",
            get(get_participant).put(update_participant).delete(delete_participant),
        )
        .route("/api/manual-payments", get(list_manual_payments))
        .route("/api/manual-payments/:id/validate", post(validate_payment))
        .route("/api/manual-payments/:id/reject", post(reject_payment))
        .route("/api/payments/:transaction_id/sync", post(sync_gateway_payment))
        .route("/api/memberships", get(list_memberships))
        .route("/api/memberships/:id/approve", post(approve_membership))
        .route("/api/memberships/:id/reject", post(reject_membership))
        .route("/api/check-in/scan", post(scan_qr_code))
        .route("/api/check-in/stats", get(check_in_stats))
        .route("/api/check-in/:participant_id", post(manual_check_in).delete(undo_check_in))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id/retry", post(retry_notification))
        .route("/api/email", post(send_email))
}

/// Session for HTML pages; redirects to the login page otherwise
async fn require_auth(headers: &HeaderMap, state: &AppState) -> std::result::Result<AdminSession, Response> {
    let token = get_session_token(headers).ok_or_else(|| Redirect::to("/admin/login").into_response())?;

    state
        .sessions
        .get_session(&token)
        .await
        .ok_or_else(|| Redirect::to("/admin/login").into_response())
}

/// Session for JSON routes
async fn api_session(headers: &HeaderMap, state: &AppState) -> Result<AdminSession> {
    let unauthorized = || AppError::Unauthorized {
        message: "Admin session required".to_string(),
    };
    let token = get_session_token(headers).ok_or_else(unauthorized)?;
    state.sessions.get_session(&token).await.ok_or_else(unauthorized)
}

// ========== Login ==========

#[derive(Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

async fn login_form(State(state): State<AppState>) -> Html<String> {
    Html(login_page(&state.event.event_name, None))
}

async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match authenticate(&state.store, &form.email, &form.password).await {
        Ok(session) => {
            let token = state.sessions.create_session(session).await;
            ([(SET_COOKIE, create_session_cookie(&token))], Redirect::to("/admin")).into_response()
        }
        Err(_) => (
            StatusCode::UNAUTHORIZED,
            Html(login_page(&state.event.event_name, Some("Invalid email or password"))),
        )
            .into_response(),
    }
}

async fn logout(headers: HeaderMap, State(state): State<AppState>) -> impl IntoResponse {
    if let Some(token) = get_session_token(&headers) {
        state.sessions.remove_session(&token).await;
    }

    ([(SET_COOKIE, create_logout_cookie())], Redirect::to("/admin/login"))
}

// ========== Pages ==========

#[derive(Deserialize, Default)]
struct ParticipantQuery {
    status: Option<DisplayStatus>,
    search: Option<String>,
}

fn badge_html(status: DisplayStatus) -> String {
    match status.badge() {
        Some(label) => format!(r#"<span class="badge {}">{}</span>"#, status.as_str(), label),
        None => r#"<span class="muted">Not paid</span>"#.to_string(),
    }
}

fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|t| t.format("%d/%m %H:%M").to_string()).unwrap_or_default()
}

async fn dashboard(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ParticipantQuery>,
) -> Response {
    let session = match require_auth(&headers, &state).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };

    let stats = state.registrations.dashboard_stats().await;
    let participants = state
        .registrations
        .list(query.status, query.search.as_deref())
        .await;

    let rows: Vec<String> = participants
        .iter()
        .map(|s| {
            let p = &s.participant;
            let action = if s.payment_status == DisplayStatus::Confirmed && !p.check_in_status {
                format!(
                    r#"<button onclick="act('POST', '/admin/api/check-in/{}')">Check in</button>"#,
                    p.id
                )
            } else if p.check_in_status {
                format!(
                    r#"<button class="secondary" onclick="act('DELETE', '/admin/api/check-in/{}')">Undo</button>"#,
                    p.id
                )
            } else {
                String::new()
            };
            format!(
                "<tr><td>{} {}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                html_escape(&p.last_name),
                html_escape(&p.first_name),
                html_escape(&p.email),
                html_escape(&p.phone),
                badge_html(s.payment_status),
                s.places.map(|n| n.to_string()).unwrap_or_default(),
                if p.check_in_status { format_time(p.checked_in_at) } else { "-".to_string() },
                action
            )
        })
        .collect();

    let filters: String = [None, Some(DisplayStatus::Confirmed), Some(DisplayStatus::Pending), Some(DisplayStatus::Rejected), Some(DisplayStatus::Unpaid)]
        .iter()
        .map(|f| match f {
            None => r#"<a href="/admin">All</a>"#.to_string(),
            Some(s) => format!(r#"<a href="/admin?status={0}">{0}</a>"#, s.as_str()),
        })
        .collect::<Vec<_>>()
        .join(" ");

    let content = format!(
        r#"<div class="cards">
            <div class="card"><h2>Participants</h2><div class="value">{participants}</div></div>
            <div class="card"><h2>Confirmed</h2><div class="value">{confirmed}</div></div>
            <div class="card"><h2>Pending</h2><div class="value">{pending}</div></div>
            <div class="card"><h2>Unpaid</h2><div class="value">{unpaid}</div></div>
            <div class="card"><h2>Checked in</h2><div class="value">{checked_in}</div></div>
            <div class="card"><h2>Revenue</h2><div class="value">{revenue} {currency}</div></div>
        </div>
        <p class="muted">{pending_payments} manual payment(s) and {pending_memberships} membership request(s) awaiting review.</p>
        <div class="toolbar">
            <div class="filters">{filters}</div>
            <form method="get" action="/admin"><input type="search" name="search" placeholder="Search name, email, phone" value="{search}"></form>
            <div class="filters">
                <a href="/admin/export/participants.csv">CSV</a>
                <a href="/admin/export/participants/print" target="_blank">Print / PDF</a>
                <a href="/admin/export/database.json">Backup</a>
            </div>
        </div>
        <table>
            <thead><tr><th>Name</th><th>Email</th><th>Phone</th><th>Payment</th><th>Places</th><th>Checked in</th><th></th></tr></thead>
            <tbody>{rows}</tbody>
        </table>"#,
        participants = stats.participants,
        confirmed = stats.confirmed,
        pending = stats.pending,
        unpaid = stats.unpaid,
        checked_in = stats.checked_in,
        revenue = stats.revenue,
        currency = html_escape(&state.event.currency),
        pending_payments = stats.pending_manual_payments,
        pending_memberships = stats.pending_memberships,
        filters = filters,
        search = html_escape(query.search.as_deref().unwrap_or_default()),
        rows = rows.join("\n"),
    );

    Html(admin_page(&state, &session, "Dashboard", &content, "")).into_response()
}

async fn payments_page(headers: HeaderMap, State(state): State<AppState>) -> Response {
    let session = match require_auth(&headers, &state).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };

    let pending = state
        .payments
        .list_manual_payments(Some(ManualPaymentStatus::Pending))
        .await;

    let rows: Vec<String> = pending
        .iter()
        .map(|view| {
            let payment = &view.payment;
            let name = view
                .participant
                .as_ref()
                .map(Participant::full_name)
                .unwrap_or_else(|| "(deleted)".to_string());
            let guests: Vec<String> = view
                .guests
                .iter()
                .map(|g| html_escape(&format!("{} {}", g.first_name, g.last_name)))
                .collect();
            format!(
                r#"<tr><td>{date}</td><td>{name}</td><td>{method}<br><span class="muted">{phone}</span></td><td>{amount} {currency}</td><td>{places}</td><td>{guests}</td><td>{comment}</td>
                <td><button onclick="act('POST', '/admin/api/manual-payments/{id}/validate', {{}})">Validate</button>
                <button class="danger" onclick="rejectWithReason('/admin/api/manual-payments/{id}/reject')">Reject</button></td></tr>"#,
                date = format_time(Some(payment.created_at)),
                name = html_escape(&name),
                method = payment.method.label(),
                phone = html_escape(&payment.phone_number),
                amount = payment.amount,
                currency = html_escape(&state.event.currency),
                places = payment.number_of_places,
                guests = guests.join("<br>"),
                comment = html_escape(payment.comment.as_deref().unwrap_or_default()),
                id = payment.id,
            )
        })
        .collect();

    let content = format!(
        r#"<div class="toolbar">
            <h2>Manual payments awaiting validation ({count})</h2>
            <div class="filters">
                <a href="/admin/export/payments.csv">CSV</a>
                <a href="/admin/export/payments/print" target="_blank">Print / PDF</a>
            </div>
        </div>
        <table>
            <thead><tr><th>Date</th><th>Participant</th><th>Method</th><th>Amount</th><th>Places</th><th>Guests</th><th>Comment</th><th></th></tr></thead>
            <tbody>{rows}</tbody>
        </table>"#,
        count = pending.len(),
        rows = rows.join("\n"),
    );

    Html(admin_page(&state, &session, "Payments", &content, "")).into_response()
}

async fn memberships_page(headers: HeaderMap, State(state): State<AppState>) -> Response {
    let session = match require_auth(&headers, &state).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };

    let memberships = state.memberships.list(None).await;
    let rows: Vec<String> = memberships
        .iter()
        .map(|m| {
            let actions = if m.status == MembershipStatus::Pending {
                format!(
                    r#"<button onclick="act('POST', '/admin/api/memberships/{0}/approve', {{}})">Approve</button>
                    <button class="danger" onclick="rejectWithReason('/admin/api/memberships/{0}/reject')">Reject</button>"#,
                    m.id
                )
            } else {
                html_escape(m.processed_by.as_deref().unwrap_or_default())
            };
            format!(
                "<tr><td>{}</td><td>{} {}</td><td>{}</td><td>{}</td><td>{:?}</td><td>{}</td><td>{}</td></tr>",
                format_time(Some(m.created_at)),
                html_escape(&m.first_name),
                html_escape(&m.last_name),
                html_escape(&m.email),
                html_escape(&m.phone),
                m.membership_type,
                m.status.as_str(),
                actions
            )
        })
        .collect();

    let content = format!(
        r#"<h2>Membership requests</h2>
        <table>
            <thead><tr><th>Date</th><th>Name</th><th>Email</th><th>Phone</th><th>Type</th><th>Status</th><th></th></tr></thead>
            <tbody>{}</tbody>
        </table>"#,
        rows.join("\n")
    );

    Html(admin_page(&state, &session, "Memberships", &content, "")).into_response()
}

async fn scan_page(headers: HeaderMap, State(state): State<AppState>) -> Response {
    let session = match require_auth(&headers, &state).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };

    let stats = state.check_ins.stats().await;
    let content = format!(
        r#"<div class="cards">
            <div class="card"><h2>Checked in</h2><div class="value" id="checked-in">{checked_in}</div></div>
            <div class="card"><h2>Remaining</h2><div class="value" id="remaining">{remaining}</div></div>
        </div>
        <form id="scan-form" class="scan">
            <input id="qr" autofocus autocomplete="off" placeholder="Scan or type a QR code (EVT-...)">
            <button type="submit">Check in</button>
        </form>
        <div id="scan-result"></div>"#,
        checked_in = stats.checked_in,
        remaining = stats.remaining,
    );

    let script = r#"
        const form = document.getElementById('scan-form');
        const input = document.getElementById('qr');
        const result = document.getElementById('scan-result');
        form.addEventListener('submit', async (e) => {
            e.preventDefault();
            const code = input.value.trim();
            input.value = '';
            if (!code) return;
            const res = await fetch('/admin/api/check-in/scan', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ qr_code_id: code })
            });
            const data = await res.json();
            if (res.ok) {
                const p = data.participant;
                result.className = 'result ok';
                result.textContent = p.first_name + ' ' + p.last_name + ' - ' + (data.places || 1) + ' place(s)';
                const stats = await (await fetch('/admin/api/check-in/stats')).json();
                document.getElementById('checked-in').textContent = stats.checked_in;
                document.getElementById('remaining').textContent = stats.remaining;
            } else {
                result.className = 'result error';
                result.textContent = data.error;
            }
            input.focus();
        });"#;

    Html(admin_page(&state, &session, "Scan", &content, script)).into_response()
}

async fn email_page(headers: HeaderMap, State(state): State<AppState>) -> Response {
    let session = match require_auth(&headers, &state).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };

    let failed = state.notifications.list(Some(NotificationStatus::Failed)).await;
    let rows: Vec<String> = failed
        .iter()
        .map(|n| {
            format!(
                r#"<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td><button onclick="act('POST', '/admin/api/notifications/{}/retry', {{}})">Resend</button></td></tr>"#,
                format_time(Some(n.last_attempt_at)),
                html_escape(&n.event),
                html_escape(&n.recipient),
                n.attempts,
                html_escape(n.error.as_deref().unwrap_or_default()),
                n.id
            )
        })
        .collect();

    let content = format!(
        r#"<h2>Send a message</h2>
        <form id="email-form" class="stack">
            <select id="recipients">
                <option value="all">All participants</option>
                <option value="confirmed">Confirmed</option>
                <option value="pending">Pending</option>
                <option value="unpaid">Unpaid</option>
            </select>
            <input id="subject" placeholder="Subject" required>
            <textarea id="body" rows="8" placeholder="Message ({{first_name}} is replaced per recipient)" required></textarea>
            <button type="submit">Send</button>
        </form>
        <div id="email-result"></div>
        <h2>Failed emails ({count})</h2>
        <table>
            <thead><tr><th>Last attempt</th><th>Event</th><th>Recipient</th><th>Attempts</th><th>Error</th><th></th></tr></thead>
            <tbody>{rows}</tbody>
        </table>"#,
        count = failed.len(),
        rows = rows.join("\n"),
    );

    let script = r#"
        document.getElementById('email-form').addEventListener('submit', async (e) => {
            e.preventDefault();
            const res = await fetch('/admin/api/email', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({
                    recipients: { kind: document.getElementById('recipients').value },
                    subject: document.getElementById('subject').value,
                    body: document.getElementById('body').value
                })
            });
            const data = await res.json();
            document.getElementById('email-result').textContent = res.ok
                ? data.sent + ' sent, ' + data.failed + ' failed'
                : data.error;
        });"#;

    Html(admin_page(&state, &session, "Email", &content, script)).into_response()
}

// ========== Exports ==========

fn csv_response(filename: &str, body: String) -> Response {
    (
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        body,
    )
        .into_response()
}

fn export_filename(prefix: &str, extension: &str) -> String {
    format!("{}-{}.{}", prefix, chrono::Utc::now().format("%Y%m%d"), extension)
}

async fn export_participants_csv(headers: HeaderMap, State(state): State<AppState>) -> Result<Response> {
    let session = api_session(&headers, &state).await?;
    let rows = export::participant_rows(&*state.store.read().await);
    info!("{} exported {} participants as CSV", session.email, rows.len());
    Ok(csv_response(
        &export_filename("participants", "csv"),
        export::participants_csv(&rows),
    ))
}

async fn export_payments_csv(headers: HeaderMap, State(state): State<AppState>) -> Result<Response> {
    let session = api_session(&headers, &state).await?;
    let rows = export::payment_rows(&*state.store.read().await);
    info!("{} exported {} payments as CSV", session.email, rows.len());
    Ok(csv_response(&export_filename("payments", "csv"), export::payments_csv(&rows)))
}

/// Full registry backup
async fn export_database(headers: HeaderMap, State(state): State<AppState>) -> Result<Response> {
    let session = api_session(&headers, &state).await?;
    let bytes = state.store.export().await?;
    info!("{} downloaded a registry backup", session.email);
    Ok((
        [
            (CONTENT_TYPE, "application/json".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export_filename("registry", "json")),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn print_participants(headers: HeaderMap, State(state): State<AppState>) -> Response {
    if let Err(redirect) = require_auth(&headers, &state).await {
        return redirect;
    }
    let rows = export::participant_rows(&*state.store.read().await);
    let table = export::paginate(
        &format!("{} - participants", state.event.event_name),
        &export::csv::PARTICIPANT_HEADER,
        rows.iter().map(|r| r.cells()).collect(),
        DEFAULT_ROWS_PER_PAGE,
    );
    let generated = chrono::Utc::now().format("%Y-%m-%d %H:%M").to_string();
    Html(export::render_print_html(&table, &generated)).into_response()
}

async fn print_payments(headers: HeaderMap, State(state): State<AppState>) -> Response {
    if let Err(redirect) = require_auth(&headers, &state).await {
        return redirect;
    }
    let rows = export::payment_rows(&*state.store.read().await);
    let table = export::paginate(
        &format!("{} - payments", state.event.event_name),
        &export::csv::PAYMENT_HEADER,
        rows.iter().map(|r| r.cells()).collect(),
        DEFAULT_ROWS_PER_PAGE,
    );
    let generated = chrono::Utc::now().format("%Y-%m-%d %H:%M").to_string();
    Html(export::render_print_html(&table, &generated)).into_response()
}

// ========== JSON API ==========

#[derive(serde::Serialize)]
struct Stats {
    #[serde(flatten)]
    registrations: DashboardStats,
    check_in: CheckInStats,
}

async fn stats(headers: HeaderMap, State(state): State<AppState>) -> Result<Json<Stats>> {
    api_session(&headers, &state).await?;
    Ok(Json(Stats {
        registrations: state.registrations.dashboard_stats().await,
        check_in: state.check_ins.stats().await,
    }))
}

async fn list_participants(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ParticipantQuery>,
) -> Result<Json<Vec<ParticipantSummary>>> {
    api_session(&headers, &state).await?;
    Ok(Json(
        state
            .registrations
            .list(query.status, query.search.as_deref())
            .await,
    ))
}

async fn get_participant(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParticipantDetail>> {
    api_session(&headers, &state).await?;
    Ok(Json(state.registrations.get(id).await?))
}

async fn update_participant(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ParticipantUpdate>,
) -> Result<Json<Participant>> {
    api_session(&headers, &state).await?;
    Ok(Json(state.registrations.update(id, update).await?))
}

async fn delete_participant(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Participant>> {
    let session = api_session(&headers, &state).await?;
    let removed = state.registrations.delete(id).await?;
    info!("Participant {} deleted by {}", id, session.email);
    Ok(Json(removed))
}

#[derive(Deserialize)]
struct StatusQuery<T> {
    status: Option<T>,
}

#[derive(Deserialize, Default)]
struct ReasonBody {
    #[serde(default)]
    reason: Option<String>,
}

async fn list_manual_payments(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<StatusQuery<ManualPaymentStatus>>,
) -> Result<Json<Vec<ManualPaymentView>>> {
    api_session(&headers, &state).await?;
    Ok(Json(state.payments.list_manual_payments(query.status).await))
}

async fn validate_payment(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ValidationOutcome>> {
    let session = api_session(&headers, &state).await?;
    Ok(Json(state.payments.validate(id, &session.email).await?))
}

async fn reject_payment(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<RejectionOutcome>> {
    let session = api_session(&headers, &state).await?;
    Ok(Json(
        state
            .payments
            .reject(id, &session.email, body.reason.as_deref())
            .await?,
    ))
}

/// Ask the gateway for a transaction's status and apply it
async fn sync_gateway_payment(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<Reconciliation>> {
    let session = api_session(&headers, &state).await?;
    let remote = state.gateway.check(&transaction_id).await?;
    info!("{} synced gateway payment {} ({})", session.email, transaction_id, remote.raw_status);
    Ok(Json(state.gateway.reconcile(&transaction_id, remote.status).await?))
}

async fn list_memberships(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<StatusQuery<MembershipStatus>>,
) -> Result<Json<Vec<Membership>>> {
    api_session(&headers, &state).await?;
    Ok(Json(state.memberships.list(query.status).await))
}

async fn approve_membership(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MembershipOutcome>> {
    let session = api_session(&headers, &state).await?;
    Ok(Json(state.memberships.approve(id, &session.email).await?))
}

async fn reject_membership(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<MembershipOutcome>> {
    let session = api_session(&headers, &state).await?;
    Ok(Json(
        state
            .memberships
            .reject(id, &session.email, body.reason.as_deref())
            .await?,
    ))
}

#[derive(Deserialize)]
struct ScanBody {
    qr_code_id: String,
}

async fn scan_qr_code(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(body): Json<ScanBody>,
) -> Result<Json<CheckInOutcome>> {
    let session = api_session(&headers, &state).await?;
    Ok(Json(state.check_ins.scan(&body.qr_code_id, &session.email).await?))
}

async fn check_in_stats(headers: HeaderMap, State(state): State<AppState>) -> Result<Json<CheckInStats>> {
    api_session(&headers, &state).await?;
    Ok(Json(state.check_ins.stats().await))
}

async fn manual_check_in(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(participant_id): Path<Uuid>,
) -> Result<Json<CheckInOutcome>> {
    let session = api_session(&headers, &state).await?;
    Ok(Json(
        state
            .check_ins
            .manual_check_in(participant_id, &session.email)
            .await?,
    ))
}

async fn undo_check_in(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(participant_id): Path<Uuid>,
) -> Result<Json<Participant>> {
    let session = api_session(&headers, &state).await?;
    let participant = state.check_ins.undo_check_in(participant_id).await?;
    info!("Check-in of {} undone by {}", participant_id, session.email);
    Ok(Json(participant))
}

async fn list_notifications(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<StatusQuery<NotificationStatus>>,
) -> Result<Json<Vec<Notification>>> {
    api_session(&headers, &state).await?;
    Ok(Json(state.notifications.list(query.status).await))
}

async fn retry_notification(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>> {
    api_session(&headers, &state).await?;
    Ok(Json(state.notifications.retry(id).await?))
}

async fn send_email(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(email): Json<CustomEmail>,
) -> Result<Json<CustomEmailReport>> {
    let session = api_session(&headers, &state).await?;
    info!("{} is sending a custom email to {:?}", session.email, email.recipients);
    Ok(Json(state.registrations.send_custom_email(email).await?))
}

// ========== Logs ==========

#[derive(Deserialize)]
struct LogQuery {
    level: Option<String>,
}

async fn logs_page(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Response {
    let session = match require_auth(&headers, &state).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };

    let logs_html: Vec<String> = state
        .log_buffer
        .get_recent(200, query.level.as_deref())
        .iter()
        .map(|entry| {
            format!(
                r#"<div class="log-entry {}"><span class="time">{}</span> <span class="level">{}</span> <span class="target">[{}]</span> {}</div>"#,
                entry.level.to_lowercase(),
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.level,
                html_escape(&entry.target),
                html_escape(&entry.message)
            )
        })
        .collect();

    let content = format!(
        r#"<div class="toolbar">
            <h2><span id="live-indicator"></span>Live logs <span id="status" class="muted">Connecting...</span></h2>
            <div class="filters">
                <a href="/admin/logs">All</a> <a href="/admin/logs?level=info">Info+</a> <a href="/admin/logs?level=warn">Warnings</a>
                <label><input type="checkbox" id="autoscroll" checked> Auto-scroll</label>
            </div>
        </div>
        <div class="log-container" id="logs">{}</div>"#,
        logs_html.join("\n")
    );

    let script = r#"
        const logsContainer = document.getElementById('logs');
        const autoscroll = document.getElementById('autoscroll');
        const indicator = document.getElementById('live-indicator');
        const status = document.getElementById('status');

        function scrollToBottom() {
            if (autoscroll.checked) logsContainer.scrollTop = logsContainer.scrollHeight;
        }

        function addLogEntry(entry) {
            const div = document.createElement('div');
            div.className = 'log-entry ' + entry.level.toLowerCase();
            const time = new Date(entry.timestamp).toLocaleTimeString('en-GB', { hour12: false });
            div.textContent = time + ' ' + entry.level + ' [' + entry.target + '] ' + entry.message;
            logsContainer.appendChild(div);
            while (logsContainer.children.length > 500) logsContainer.removeChild(logsContainer.firstChild);
            scrollToBottom();
        }

        const source = new EventSource('/admin/logs/stream');
        source.onopen = () => { indicator.classList.remove('disconnected'); status.textContent = 'Connected'; };
        source.onmessage = (event) => {
            try { addLogEntry(JSON.parse(event.data)); } catch (e) { console.error('Bad log entry', e); }
        };
        source.onerror = () => { indicator.classList.add('disconnected'); status.textContent = 'Reconnecting...'; };
        scrollToBottom();"#;

    Html(admin_page(&state, &session, "Logs", &content, script)).into_response()
}

/// GET /admin/logs/stream - SSE endpoint for live logs
async fn logs_stream(headers: HeaderMap, State(state): State<AppState>) -> Result<Response> {
    api_session(&headers, &state).await?;

    let rx = state.log_buffer.subscribe();
    // Lagged receivers skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        result
            .ok()
            .map(|entry| Ok::<_, Infallible>(Event::default().data(entry.to_json())))
    });

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
        .into_response())
}

// ========== Layout ==========

fn admin_page(state: &AppState, session: &AdminSession, title: &str, content: &str, script: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - {event} Admin</title>
    <style>
        * {{ box-sizing: border-box; margin: 0; padding: 0; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #1a1a2e;
            min-height: 100vh;
            color: #fff;
        }}
        .navbar {{
            background: rgba(255,255,255,0.05);
            padding: 1rem 2rem;
            display: flex;
            justify-content: space-between;
            align-items: center;
            border-bottom: 1px solid rgba(255,255,255,0.1);
        }}
        .navbar h1 {{ font-size: 1.25rem; }}
        .navbar .user {{ display: flex; align-items: center; gap: 1rem; }}
        a {{ color: #5865F2; text-decoration: none; }}
        a:hover {{ text-decoration: underline; }}
        .container {{ max-width: 1300px; margin: 0 auto; padding: 2rem; }}
        .nav-links {{ display: flex; gap: 1rem; margin-bottom: 2rem; flex-wrap: wrap; }}
        .nav-links a {{ padding: 0.5rem 1rem; background: rgba(255,255,255,0.05); border-radius: 8px; }}
        .cards {{
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
            gap: 1rem;
            margin-bottom: 1.5rem;
        }}
        .card {{
            background: rgba(255,255,255,0.05);
            border-radius: 12px;
            padding: 1.25rem;
            border: 1px solid rgba(255,255,255,0.1);
        }}
        .card h2 {{ font-size: 0.9rem; color: #a0a0a0; margin-bottom: 0.5rem; }}
        .card .value {{ font-size: 1.8rem; font-weight: bold; }}
        h2 {{ margin: 1rem 0; }}
        .toolbar {{ display: flex; justify-content: space-between; align-items: center; gap: 1rem; margin: 1rem 0; flex-wrap: wrap; }}
        .filters {{ display: flex; gap: 0.75rem; align-items: center; }}
        table {{ width: 100%; border-collapse: collapse; background: rgba(255,255,255,0.05); border-radius: 12px; overflow: hidden; }}
        th, td {{ padding: 0.75rem; text-align: left; border-bottom: 1px solid rgba(255,255,255,0.1); vertical-align: top; }}
        th {{ background: rgba(255,255,255,0.05); color: #a0a0a0; font-weight: 500; }}
        .badge {{ padding: 2px 8px; border-radius: 4px; font-size: 0.8rem; font-weight: 600; }}
        .badge.confirmed {{ background: #2ecc71; }}
        .badge.pending {{ background: #f39c12; }}
        .badge.rejected {{ background: #e74c3c; }}
        .muted {{ color: #808080; }}
        input, select, textarea {{
            padding: 0.6rem;
            border-radius: 8px;
            border: 1px solid rgba(255,255,255,0.2);
            background: rgba(0,0,0,0.2);
            color: #fff;
            font: inherit;
        }}
        button {{ padding: 0.4rem 0.9rem; border: none; border-radius: 6px; background: #5865F2; color: #fff; cursor: pointer; }}
        button.danger {{ background: #e74c3c; }}
        button.secondary {{ background: #555; }}
        .stack {{ display: flex; flex-direction: column; gap: 0.75rem; max-width: 600px; margin-bottom: 1rem; }}
        .scan {{ display: flex; gap: 1rem; }}
        .scan input {{ flex: 1; font-size: 1.5rem; }}
        .result {{ margin-top: 1.5rem; padding: 1.5rem; border-radius: 12px; font-size: 1.4rem; }}
        .result.ok {{ background: rgba(46,204,113,0.25); }}
        .result.error {{ background: rgba(231,76,60,0.25); }}
        .log-container {{
            background: #0d0d1a;
            border-radius: 8px;
            padding: 1rem;
            font-family: 'SF Mono', 'Fira Code', monospace;
            font-size: 0.85rem;
            height: calc(100vh - 260px);
            overflow-y: auto;
            border: 1px solid rgba(255,255,255,0.1);
        }}
        .log-entry {{ padding: 0.25rem 0; border-bottom: 1px solid rgba(255,255,255,0.05); white-space: pre-wrap; word-break: break-all; }}
        .log-entry.error {{ color: #e74c3c; }}
        .log-entry.warn {{ color: #f39c12; }}
        .log-entry.debug {{ color: #888; }}
        #live-indicator {{ display: inline-block; width: 8px; height: 8px; background: #2ecc71; border-radius: 50%; margin-right: 0.5rem; }}
        #live-indicator.disconnected {{ background: #e74c3c; }}
    </style>
</head>
<body>
    <nav class="navbar">
        <h1>{event} Admin</h1>
        <div class="user">
            <span>{user}</span>
            <a href="/admin/logout">Logout</a>
        </div>
    </nav>
    <div class="container">
        <div class="nav-links">
            <a href="/admin">Dashboard</a>
            <a href="/admin/payments">Payments</a>
            <a href="/admin/memberships">Memberships</a>
            <a href="/admin/scan">Scan</a>
            <a href="/admin/email">Email</a>
            <a href="/admin/logs">Logs</a>
        </div>
        {content}
    </div>
    <script>
        async function act(method, url, body) {{
            const res = await fetch(url, {{
                method,
                headers: {{ 'Content-Type': 'application/json' }},
                body: body === undefined ? undefined : JSON.stringify(body)
            }});
            const data = await res.json().catch(() => ({{}}));
            if (!res.ok) {{ alert(data.error || res.statusText); return; }}
            if (data.warnings && data.warnings.length) alert(data.warnings.join('\n'));
            location.reload();
        }}
        function rejectWithReason(url) {{
            const reason = prompt('Reason (optional)');
            if (reason === null) return;
            act('POST', url, {{ reason }});
        }}
        {script}
    </script>
</body>
</html>"#,
        title = html_escape(title),
        event = html_escape(&state.event.event_name),
        user = html_escape(&session.display_name),
        content = content,
        script = script,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::testing::Fixture;
    use crate::web::build_router;
    use crate::web::testing::{admin_cookie, app_state, body_json, body_text, ADMIN_EMAIL, ADMIN_PASSWORD};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn authed(method: &str, uri: &str, cookie: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("cookie", cookie)
            .header("content-type", "application/json");
        builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap()
    }

    #[tokio::test]
    async fn test_pages_redirect_and_api_refuses_without_session() {
        let fx = Fixture::new();
        let app = build_router(app_state(&fx));

        let page = app
            .clone()
            .oneshot(Request::get("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(page.status(), StatusCode::SEE_OTHER);
        assert_eq!(page.headers()["location"], "/admin/login");

        let api = app
            .oneshot(Request::get("/admin/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
        assert!(body_json(api).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_login_sets_session_cookie() {
        let fx = Fixture::new();
        let state = app_state(&fx);
        admin_cookie(&state).await;
        let app = build_router(state);

        let form = format!("email={}&password={}", ADMIN_EMAIL, ADMIN_PASSWORD);
        let response = app
            .clone()
            .oneshot(
                Request::post("/admin/login")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(form))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
        assert!(cookie.starts_with("admin_session="));

        let session = cookie.split(';').next().unwrap();
        let dashboard = app.oneshot(authed("GET", "/admin", session, None)).await.unwrap();
        assert_eq!(dashboard.status(), StatusCode::OK);

        let bad = build_router(app_state(&fx))
            .oneshot(
                Request::post("/admin/login")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("email=admin%40example.com&password=wrong"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_validate_then_scan_twice() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        let state = app_state(&fx);
        let cookie = admin_cookie(&state).await;
        let app = build_router(state);

        let submission = fx
            .payments
            .submit_manual_payment(crate::managers::payment_manager::ManualPaymentForm {
                participant_id: participant.id,
                method: crate::models::ManualPaymentMethod::Cash,
                phone_number: "0701020304".to_string(),
                comment: None,
                number_of_places: 1,
                guests: Vec::new(),
            })
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(authed(
                "POST",
                &format!("/admin/api/manual-payments/{}/validate", submission.payment.id),
                &cookie,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcome = body_json(response).await;
        assert_eq!(outcome["payment"]["validated_by"], ADMIN_EMAIL);
        let qr = outcome["qr_code_id"].as_str().unwrap().to_string();

        let scan = |app: Router| {
            let request = authed(
                "POST",
                "/admin/api/check-in/scan",
                &cookie,
                Some(serde_json::json!({ "qr_code_id": qr })),
            );
            async move { app.oneshot(request).await.unwrap() }
        };
        assert_eq!(scan(app.clone()).await.status(), StatusCode::OK);
        let again = scan(app.clone()).await;
        assert_eq!(again.status(), StatusCode::CONFLICT);
        assert!(body_json(again).await["error"].as_str().unwrap().contains("already checked in"));
    }

    #[tokio::test]
    async fn test_reject_requires_pending() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        fx.confirmed_ticket(participant.id, 1).await;
        let payment_id = fx.payments.list_manual_payments(None).await[0].payment.id;
        let state = app_state(&fx);
        let cookie = admin_cookie(&state).await;

        let response = build_router(state)
            .oneshot(authed(
                "POST",
                &format!("/admin/api/manual-payments/{}/reject", payment_id),
                &cookie,
                Some(serde_json::json!({ "reason": "late" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_csv_export() {
        let fx = Fixture::new();
        fx.participant("awa@example.com").await;
        fx.participant("kofi@example.com").await;
        let state = app_state(&fx);
        let cookie = admin_cookie(&state).await;

        let response = build_router(state)
            .oneshot(authed("GET", "/admin/export/participants.csv", &cookie, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"].to_str().unwrap().starts_with("text/csv"));
        let csv = body_text(response).await;
        assert_eq!(csv.split_terminator("\r\n").count(), 3);
        assert!(csv.starts_with("Last name,First name,Email"));
    }

    #[tokio::test]
    async fn test_backup_download_has_no_credentials() {
        let fx = Fixture::new();
        fx.participant("awa@example.com").await;
        let state = app_state(&fx);
        let cookie = admin_cookie(&state).await;

        let response = build_router(state)
            .oneshot(authed("GET", "/admin/export/database.json", &cookie, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let backup = body_text(response).await;
        assert!(backup.contains("awa@example.com"));
        assert!(!backup.contains("password_hash"));
        assert!(!backup.contains("\"salt\""));
    }

    #[tokio::test]
    async fn test_custom_email_route() {
        let fx = Fixture::new();
        fx.participant("awa@example.com").await;
        let state = app_state(&fx);
        let cookie = admin_cookie(&state).await;

        let response = build_router(state)
            .oneshot(authed(
                "POST",
                "/admin/api/email",
                &cookie,
                Some(serde_json::json!({
                    "recipients": { "kind": "unpaid" },
                    "subject": "Reminder",
                    "body": "Hello {first_name}, please complete your payment."
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["sent"], 1);
    }
}
