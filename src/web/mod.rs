//! HTTP surface: public registration API, participant pages and the admin panel

mod admin;
mod auth;
mod server;

pub use admin::admin_router;
pub use auth::{create_session_store, seed_admin_from_env, SharedSessionStore};
pub use server::{build_router, start_web_server, AppState, WebServerConfig};

pub(crate) use crate::export::html_escape;
