//! Admin authentication: password accounts from the `users` table and cookie sessions

use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::AdminUser;
use crate::state::SharedRegistryStore;

const SESSION_COOKIE: &str = "admin_session";
const SESSION_TTL_SECS: i64 = 12 * 3600;
const PASSWORD_ITERATIONS: u32 = 100_000;
const PASSWORD_HASH_LEN: usize = 32;

/// Session data for an authenticated admin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSession {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl AdminSession {
    pub fn new(user: &AdminUser) -> Self {
        let now = chrono::Utc::now();
        Self {
            user_id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            created_at: now,
            expires_at: now + chrono::Duration::seconds(SESSION_TTL_SECS),
        }
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now() >= self.expires_at
    }
}

/// Maps opaque session tokens to sessions
pub struct SessionStore {
    sessions: RwLock<HashMap<String, AdminSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Store the session under a fresh random token
    pub async fn create_session(&self, session: AdminSession) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !s.is_expired());
        sessions.insert(token.clone(), session);
        token
    }

    pub async fn get_session(&self, token: &str) -> Option<AdminSession> {
        let sessions = self.sessions.read().await;
        sessions.get(token).filter(|s| !s.is_expired()).cloned()
    }

    pub async fn remove_session(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }
}

pub type SharedSessionStore = Arc<SessionStore>;

pub fn create_session_store() -> SharedSessionStore {
    Arc::new(SessionStore::new())
}

pub fn generate_salt() -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    hex::encode(salt)
}

/// Hex PBKDF2-HMAC-SHA256 of the password with the account's salt
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut out = [0u8; PASSWORD_HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), PASSWORD_ITERATIONS, &mut out);
    hex::encode(out)
}

pub fn verify_password(user: &AdminUser, password: &str) -> bool {
    let Ok(expected) = hex::decode(&user.password_hash) else {
        return false;
    };
    if expected.len() != PASSWORD_HASH_LEN {
        return false;
    }
    let mut out = [0u8; PASSWORD_HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), user.salt.as_bytes(), PASSWORD_ITERATIONS, &mut out);
    out.ct_eq(expected.as_slice()).into()
}

/// Check credentials and stamp the login time
pub async fn authenticate(store: &SharedRegistryStore, email: &str, password: &str) -> Result<AdminSession> {
    let denied = || AppError::Unauthorized {
        message: "Invalid email or password".to_string(),
    };

    let session = {
        let mut db = store.write().await;
        let user_id = match db.find_admin_by_email(email) {
            Some(user) if verify_password(user, password) => user.id,
            _ => {
                warn!("Failed admin login for {}", email.trim());
                return Err(denied());
            }
        };
        let user = db.users.get_mut(&user_id).ok_or_else(denied)?;
        user.last_login_at = Some(chrono::Utc::now());
        let session = AdminSession::new(user);
        db.touch();
        session
    };
    store.persist().await?;

    info!("Admin {} logged in", session.email);
    Ok(session)
}

/// Create the admin account if no account has this email yet
pub async fn seed_admin(store: &SharedRegistryStore, email: &str, password: &str, display_name: &str) -> Result<bool> {
    let email = email.trim().to_lowercase();
    if password.len() < 8 {
        return Err(AppError::ConfigValidation {
            message: "Admin password must be at least 8 characters".to_string(),
        });
    }

    {
        let mut db = store.write().await;
        if db.find_admin_by_email(&email).is_some() {
            return Ok(false);
        }
        let salt = generate_salt();
        let user = AdminUser {
            id: Uuid::new_v4(),
            email: email.clone(),
            display_name: display_name.to_string(),
            password_hash: hash_password(password, &salt),
            salt,
            created_at: chrono::Utc::now(),
            last_login_at: None,
        };
        db.users.insert(user.id, user);
        db.touch();
    }
    store.persist().await?;

    info!("Created admin account {}", email);
    Ok(true)
}

/// Seed from ADMIN_EMAIL / ADMIN_PASSWORD when both are set
pub async fn seed_admin_from_env(store: &SharedRegistryStore) -> Result<()> {
    let (Ok(email), Ok(password)) = (std::env::var("ADMIN_EMAIL"), std::env::var("ADMIN_PASSWORD")) else {
        if store.read().await.users.is_empty() {
            warn!("No admin account exists; set ADMIN_EMAIL and ADMIN_PASSWORD to create one");
        }
        return Ok(());
    };
    let display_name = std::env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string());
    seed_admin(store, &email, &password, &display_name).await?;
    Ok(())
}

pub fn get_session_token(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE);
    headers
        .get(axum::http::header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| cookie.trim().strip_prefix(prefix.as_str()).map(str::to_string))
        .filter(|token| !token.is_empty())
}

pub fn create_session_cookie(token: &str) -> String {
    format!(
        "{}={}; Path=/admin; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, SESSION_TTL_SECS
    )
}

pub fn create_logout_cookie() -> String {
    format!("{}=; Path=/admin; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

pub fn login_page(event_name: &str, error: Option<&str>) -> String {
    let error_html = error
        .map(|e| format!(r#"<div class="error">{}</div>"#, super::html_escape(e)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Admin Login - {event_name}</title>
    <style>
        * {{ box-sizing: border-box; margin: 0; padding: 0; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%);
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            color: #fff;
        }}
        .container {{
            background: rgba(255,255,255,0.05);
            border-radius: 16px;
            padding: 3rem;
            border: 1px solid rgba(255,255,255,0.1);
            max-width: 400px;
            width: 90%;
        }}
        h1 {{ font-size: 1.6rem; margin-bottom: 1.5rem; text-align: center; }}
        label {{ display: block; color: #a0a0a0; margin-bottom: 0.25rem; }}
        input {{
            width: 100%;
            padding: 0.75rem;
            margin-bottom: 1rem;
            border-radius: 8px;
            border: 1px solid rgba(255,255,255,0.2);
            background: rgba(0,0,0,0.2);
            color: #fff;
        }}
        button {{
            width: 100%;
            padding: 0.9rem;
            border: none;
            border-radius: 8px;
            background: #5865F2;
            color: #fff;
            font-weight: 600;
            cursor: pointer;
        }}
        .error {{
            background: rgba(231,76,60,0.2);
            color: #e74c3c;
            padding: 0.75rem;
            border-radius: 8px;
            margin-bottom: 1rem;
        }}
    </style>
</head>
<body>
    <div class="container">
        <h1>{event_name} Admin</h1>
        {error_html}
        <form method="post" action="/admin/login">
            <label for="email">Email</label>
            <input type="email" id="email" name="email" required>
            <label for="password">Password</label>
            <input type="password" id="password" name="password" required>
            <button type="submit">Sign in</button>
        </form>
    </div>
</body>
</html>"#,
        event_name = super::html_escape(event_name),
        error_html = error_html
    )
}
