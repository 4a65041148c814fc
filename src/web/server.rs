//! Public routes, participant pages and server start-up

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use super::admin::admin_router;
use super::auth::SharedSessionStore;
use super::html_escape;
use crate::config::EventConfig;
use crate::error::Result;
use crate::gateway::RemoteStatus;
use crate::logging::SharedLogBuffer;
use crate::managers::gateway_manager::{Checkout, Reconciliation};
use crate::managers::membership_manager::{MembershipOutcome, MembershipRequest};
use crate::managers::payment_manager::{ManualPaymentForm, ManualPaymentSubmission};
use crate::managers::registration_manager::{NewParticipant, Registration};
use crate::managers::{
    SharedCheckInManager, SharedGatewayManager, SharedMembershipManager, SharedNotificationManager,
    SharedPaymentManager, SharedRegistrationManager,
};
use crate::models::DisplayStatus;
use crate::state::SharedRegistryStore;

/// Web server configuration
pub struct WebServerConfig {
    pub port: u16,
    /// Certificate and key PEM paths; plain HTTP when unset
    pub tls: Option<(PathBuf, PathBuf)>,
}

impl WebServerConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let tls = match (std::env::var("TLS_CERT_PATH"), std::env::var("TLS_KEY_PATH")) {
            (Ok(cert), Ok(key)) => Some((PathBuf::from(cert), PathBuf::from(key))),
            _ => None,
        };
        Self { port, tls }
    }
}

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub event: Arc<EventConfig>,
    pub store: SharedRegistryStore,
    pub registrations: SharedRegistrationManager,
    pub payments: SharedPaymentManager,
    pub memberships: SharedMembershipManager,
    pub check_ins: SharedCheckInManager,
    pub gateway: SharedGatewayManager,
    pub notifications: SharedNotificationManager,
    pub sessions: SharedSessionStore,
    pub log_buffer: SharedLogBuffer,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let api = Router::new()
        .route("/event", get(event_info))
        .route("/participants", post(register))
        .route("/participants/:id", get(participant_status))
        .route("/payments/manual", post(submit_manual_payment))
        .route("/payments/initiate", post(initiate_payment))
        .route("/payments/webhook", post(payment_webhook))
        .route("/payments/:transaction_id/check", get(check_payment))
        .route("/memberships", post(request_membership))
        .layer(cors);

    Router::new()
        .route("/", get(health))
        .route("/confirmation/:id", get(confirmation_page))
        .route("/pending/:id", get(pending_page))
        .nest("/api", api)
        .nest("/admin", admin_router())
        .with_state(state)
}

pub async fn start_web_server(config: WebServerConfig, state: AppState) -> anyhow::Result<()> {
    let base_url = state.event.public_base_url.clone();
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    match config.tls {
        Some((cert_path, key_path)) => {
            if !cert_path.exists() {
                return Err(anyhow::anyhow!("Certificate file not found: {}", cert_path.display()));
            }
            if !key_path.exists() {
                return Err(anyhow::anyhow!("Private key file not found: {}", key_path.display()));
            }
            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .map_err(|e| anyhow::anyhow!(
                    "Failed to load TLS certificates: {}\n  Certificate: {}\n  Private key: {}",
                    e, cert_path.display(), key_path.display()
                ))?;

            info!("Web server listening on https://0.0.0.0:{}", config.port);
            info!("Admin panel available at {}/admin", base_url);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Web server listening on http://{}", listener.local_addr()?);
            info!("Admin panel available at {}/admin", base_url);
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

async fn health() -> &'static str {
    "Event registration service running"
}

#[derive(Serialize)]
struct EventInfo {
    event_name: String,
    unit_price: u64,
    currency: String,
    max_places: u8,
    online_payment: bool,
}

/// GET /api/event - public settings for the registration form
async fn event_info(State(state): State<AppState>) -> Json<EventInfo> {
    Json(EventInfo {
        event_name: state.event.event_name.clone(),
        unit_price: state.event.unit_price,
        currency: state.event.currency.clone(),
        max_places: state.event.max_places,
        online_payment: state.gateway.is_enabled(),
    })
}

async fn register(
    State(state): State<AppState>,
    Json(form): Json<NewParticipant>,
) -> Result<(StatusCode, Json<Registration>)> {
    let registration = state.registrations.register(form).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// What a participant may see about their own registration
#[derive(Serialize)]
struct ParticipantStatus {
    id: Uuid,
    first_name: String,
    last_name: String,
    payment_status: DisplayStatus,
    badge: Option<&'static str>,
    places: Option<u8>,
    qr_code_id: Option<String>,
    qr_code_url: Option<String>,
    checked_in: bool,
}

async fn load_status(state: &AppState, id: Uuid) -> Result<ParticipantStatus> {
    let db = state.store.read().await;
    let participant = db.participant(id)?;
    let status = db.display_status(id);
    // A QR code is only shown while the payment stands confirmed
    let qr_code_id = participant
        .qr_code_id
        .clone()
        .filter(|_| status == DisplayStatus::Confirmed);

    Ok(ParticipantStatus {
        id,
        first_name: participant.first_name.clone(),
        last_name: participant.last_name.clone(),
        payment_status: status,
        badge: status.badge(),
        places: db.confirmed_places(id),
        qr_code_url: qr_code_id.as_deref().map(|qr| state.event.qr_image_url(qr)),
        qr_code_id,
        checked_in: participant.check_in_status,
    })
}

async fn participant_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ParticipantStatus>> {
    Ok(Json(load_status(&state, id).await?))
}

async fn submit_manual_payment(
    State(state): State<AppState>,
    Json(form): Json<ManualPaymentForm>,
) -> Result<(StatusCode, Json<ManualPaymentSubmission>)> {
    let submission = state.payments.submit_manual_payment(form).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

#[derive(Deserialize)]
struct InitiateRequest {
    participant_id: Uuid,
    number_of_places: u8,
}

async fn initiate_payment(
    State(state): State<AppState>,
    Json(request): Json<InitiateRequest>,
) -> Result<Json<Checkout>> {
    let checkout = state
        .gateway
        .initiate(request.participant_id, request.number_of_places)
        .await?;
    Ok(Json(checkout))
}

async fn check_payment(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<RemoteStatus>> {
    Ok(Json(state.gateway.check(&transaction_id).await?))
}

/// POST /api/payments/webhook - gateway notification, signed in `x-token`
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Reconciliation>> {
    let signature = headers.get("x-token").and_then(|v| v.to_str().ok());
    Ok(Json(state.gateway.handle_webhook(signature, &body).await?))
}

async fn request_membership(
    State(state): State<AppState>,
    Json(form): Json<MembershipRequest>,
) -> Result<(StatusCode, Json<MembershipOutcome>)> {
    let outcome = state.memberships.request(form).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /confirmation/:id - ticket page with the QR code
async fn confirmation_page(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(id) = Uuid::parse_str(&id) else {
        return (StatusCode::NOT_FOUND, Html(error_page("This registration link is not valid.")));
    };
    let status = match load_status(&state, id).await {
        Ok(status) => status,
        Err(_) => return (StatusCode::NOT_FOUND, Html(error_page("Registration not found."))),
    };

    let name = html_escape(&format!("{} {}", status.first_name, status.last_name));
    let body = match (&status.qr_code_id, &status.qr_code_url) {
        (Some(qr), Some(url)) => format!(
            r#"<div class="icon">✓</div>
        <h1>You're in, {name}!</h1>
        <p>Show this code at the entrance.</p>
        <img src="{url}" alt="QR code" width="240" height="240">
        <div class="code">{qr}</div>
        <p class="muted">{places} place(s)</p>"#,
            name = name,
            url = html_escape(url),
            qr = html_escape(qr),
            places = status.places.unwrap_or(1),
        ),
        _ => format!(
            r#"<h1>Hello {name}</h1>
        <p>Your payment is not confirmed yet (status: {status}).</p>
        <p><a href="/pending/{id}">Check payment status</a></p>"#,
            name = name,
            status = status.payment_status.as_str(),
            id = id,
        ),
    };

    (StatusCode::OK, Html(page(&state.event.event_name, &body)))
}

/// GET /pending/:id - where payers land after checkout or a manual transfer
async fn pending_page(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(id) = Uuid::parse_str(&id) else {
        return (StatusCode::NOT_FOUND, Html(error_page("This registration link is not valid.")));
    };
    let status = match load_status(&state, id).await {
        Ok(status) => status,
        Err(_) => return (StatusCode::NOT_FOUND, Html(error_page("Registration not found."))),
    };

    let message = match status.payment_status {
        DisplayStatus::Confirmed => format!(
            r#"<p>Your payment is confirmed.</p><p><a href="/confirmation/{}">View your ticket</a></p>"#,
            id
        ),
        DisplayStatus::Pending => format!(
            r#"<p>Your payment is being verified. You will receive an email with your ticket once it is confirmed.</p>
        <p><a href="/pending/{}">Refresh</a></p>"#,
            id
        ),
        DisplayStatus::Rejected => "<p>Your payment could not be confirmed. Please contact the organisers or submit a new payment.</p>".to_string(),
        DisplayStatus::Unpaid => "<p>No payment has been recorded for this registration yet.</p>".to_string(),
    };
    let body = format!(
        "<h1>Payment status: {}</h1>\n        {}",
        status.badge.unwrap_or("Not paid"),
        message
    );

    (StatusCode::OK, Html(page(&state.event.event_name, &body)))
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
            margin: 0;
            background: linear-gradient(135deg, #11998e 0%, #38ef7d 100%);
        }}
        .container {{
            background: white;
            padding: 40px;
            border-radius: 16px;
            box-shadow: 0 10px 40px rgba(0,0,0,0.2);
            text-align: center;
            max-width: 420px;
        }}
        h1 {{ color: #333; margin-bottom: 10px; }}
        p {{ color: #666; }}
        .icon {{ font-size: 60px; color: #11998e; }}
        .code {{
            background: #f5f5f5;
            padding: 10px;
            border-radius: 8px;
            font-family: monospace;
            font-size: 18px;
            letter-spacing: 2px;
            margin: 16px 0;
        }}
        .muted {{ color: #999; font-size: 14px; }}
    </style>
</head>
<body>
    <div class="container">
        {body}
    </div>
</body>
</html>"#,
        title = html_escape(title),
        body = body
    )
}

fn error_page(message: &str) -> String {
    page(
        "Error",
        &format!(
            r#"<div class="icon" style="color: #f5576c;">✕</div>
        <h1>Something went wrong</h1>
        <p>{}</p>"#,
            html_escape(message)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::testing::Fixture;
    use crate::web::testing::{app_state, body_json, body_text};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_then_pay_manually() {
        let fx = Fixture::new();
        let app = build_router(app_state(&fx));

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/participants",
                serde_json::json!({
                    "first_name": "Awa",
                    "last_name": "Traore",
                    "email": "awa@example.com",
                    "phone": "0701020304"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["participant"]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/payments/manual",
                serde_json::json!({
                    "participant_id": id,
                    "method": "wave",
                    "phone_number": "0701020304",
                    "number_of_places": 2,
                    "guests": [{ "first_name": "Ali", "last_name": "Yao" }]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["guests"].as_array().unwrap().len(), 2);

        let response = app
            .oneshot(Request::get(format!("/api/participants/{}", id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = body_json(response).await;
        assert_eq!(status["payment_status"], "pending");
        assert!(status["qr_code_id"].is_null());
    }

    #[tokio::test]
    async fn test_validation_error_is_json_400() {
        let fx = Fixture::new();
        let app = build_router(app_state(&fx));

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/participants",
                serde_json::json!({
                    "first_name": "Awa",
                    "last_name": "Traore",
                    "email": "awa@example.com",
                    "phone": "12345"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].as_str().unwrap().contains("10 digits"));
    }

    #[tokio::test]
    async fn test_confirmation_page_shows_qr_code() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        let qr = fx.confirmed_ticket(participant.id, 1).await;
        let app = build_router(app_state(&fx));

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/confirmation/{}", participant.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(&qr));

        let response = app
            .oneshot(Request::get("/pending/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pending_page_offers_manual_refresh() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        let app = build_router(app_state(&fx));

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/payments/manual",
                serde_json::json!({
                    "participant_id": participant.id,
                    "method": "wave",
                    "phone_number": "0701020304",
                    "number_of_places": 1,
                    "guests": []
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(
                Request::get(format!("/pending/{}", participant.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("being verified"));
        assert!(html.contains(&format!(r#"<a href="/pending/{}">Refresh</a>"#, participant.id)));
        assert!(!html.contains("<script"));
        assert!(!html.contains("setTimeout"));
    }

    #[tokio::test]
    async fn test_initiate_without_gateway_is_bad_gateway() {
        let fx = Fixture::new();
        let participant = fx.participant("awa@example.com").await;
        let app = build_router(app_state(&fx));

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/payments/initiate",
                serde_json::json!({ "participant_id": participant.id, "number_of_places": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
