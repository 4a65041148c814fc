use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Event registration, payment validation and entrance check-in service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Event settings as JSON; defaults plus environment overrides when omitted
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Where the registry database is kept
    #[arg(long, default_value = "state/registry.json")]
    state_path: PathBuf,

    /// Listen port (overrides PORT)
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Capture debug-level entries for the admin log page
    #[arg(long)]
    debug_logs: bool,
}

mod config;
mod error;
mod export;
mod gateway;
mod logging;
mod mailer;
mod managers;
mod messages;
mod models;
mod state;
mod validation;
mod web;

use config::{EmailConfig, EmailTemplates, EventConfig, GatewayConfig};
use gateway::GatewayClient;
use mailer::{EmailJsMailer, LogMailer, Mailer};
use managers::{
    create_shared_checkin_manager, create_shared_gateway_manager, create_shared_membership_manager,
    create_shared_notification_manager, create_shared_payment_manager, create_shared_registration_manager,
};
use state::{create_shared_registry_store, RegistryDatabase};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    // Create log buffer for web admin panel
    let log_buffer = logging::create_log_buffer(1000);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let capture_level = if args.debug_logs {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_filter(tracing_subscriber::filter::LevelFilter::INFO),
        )
        .with(logging::LogCaptureLayer::new(log_buffer.clone()).with_max_level(capture_level))
        .init();

    let event = match &args.config {
        Some(path) => {
            info!("Loading event configuration from {}...", path);
            EventConfig::load_from_file(path)?
        }
        None => EventConfig::default(),
    }
    .with_env_overrides();
    event.validate()?;
    if event.admin_email.is_empty() {
        warn!("ADMIN_NOTIFICATION_EMAIL not set: admin notifications will not be sent");
    }
    let event = Arc::new(event);
    info!(
        "Event: {} ({} {} per place, up to {} places)",
        event.event_name, event.unit_price, event.currency, event.max_places
    );

    if let Some(dir) = args.state_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    info!("Loading registry database from {}...", args.state_path.display());
    let db = RegistryDatabase::load(&args.state_path).await?;
    info!(
        "Loaded {} participants, {} manual payments, {} memberships",
        db.participants.len(),
        db.manual_payments.len(),
        db.memberships.len()
    );
    let store = create_shared_registry_store(db, Some(args.state_path.clone()));

    let (mailer, templates): (Arc<dyn Mailer>, EmailTemplates) = match EmailConfig::from_env() {
        Some(email_config) => {
            info!("Email delivery enabled via {}", email_config.api_url);
            let templates = email_config.templates.clone();
            (Arc::new(EmailJsMailer::new(email_config)), templates)
        }
        None => {
            warn!("Email service not configured (EMAIL_SERVICE_ID / EMAIL_PUBLIC_KEY): emails will only be logged");
            (Arc::new(LogMailer), EmailTemplates::uniform("template_default"))
        }
    };

    let gateway_client = match GatewayConfig::from_env() {
        Some(gateway_config) => {
            if gateway_config.webhook_secret.is_none() {
                warn!("GATEWAY_WEBHOOK_SECRET not set: webhook signatures are not verified");
            }
            info!("Online payments enabled via {}", gateway_config.api_base);
            Some(GatewayClient::new(gateway_config)?)
        }
        None => {
            info!("Payment gateway not configured: manual payments only");
            None
        }
    };

    // Create managers
    let notifications = create_shared_notification_manager(store.clone(), mailer, templates);
    let registrations = create_shared_registration_manager(store.clone(), notifications.clone(), event.clone());
    let payments = create_shared_payment_manager(store.clone(), notifications.clone(), event.clone());
    let memberships = create_shared_membership_manager(store.clone(), notifications.clone(), event.clone());
    let check_ins = create_shared_checkin_manager(store.clone());
    let gateway = create_shared_gateway_manager(store.clone(), notifications.clone(), event.clone(), gateway_client);

    web::seed_admin_from_env(&store).await?;

    let mut web_config = web::WebServerConfig::from_env();
    if let Some(port) = args.port {
        web_config.port = port;
    }

    let app_state = web::AppState {
        event,
        store,
        registrations,
        payments,
        memberships,
        check_ins,
        gateway,
        notifications,
        sessions: web::create_session_store(),
        log_buffer,
    };

    web::start_web_server(web_config, app_state).await?;
    warn!("Web server ended.");

    Ok(())
}
