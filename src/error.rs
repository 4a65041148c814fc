use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Failed to load config file '{path}': {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {message}")]
    ConfigValidation { message: String },

    // State errors
    #[error("Failed to save state to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Workflow errors
    #[error("{message}")]
    Validation { message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Cannot {action} {entity} with status '{status}'")]
    InvalidTransition {
        entity: &'static str,
        action: &'static str,
        status: String,
    },

    #[error("{name} already checked in at {at}")]
    AlreadyCheckedIn {
        name: String,
        at: chrono::DateTime<chrono::Utc>,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    // Third-party errors
    #[error("Email dispatch failed: {message}")]
    Email { message: String },

    #[error("Payment gateway error: {message}")]
    Gateway { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. }
            | AppError::InvalidTransition { .. }
            | AppError::AlreadyCheckedIn { .. } => StatusCode::CONFLICT,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Email { .. } | AppError::Gateway { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::validation("bad phone").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("Participant", "abc").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InvalidTransition {
                entity: "manual payment",
                action: "reject",
                status: "completed".to_string(),
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_messages() {
        let err = AppError::not_found("Participant", "abc");
        assert_eq!(err.to_string(), "Participant not found: abc");

        let err = AppError::InvalidTransition {
            entity: "membership",
            action: "approve",
            status: "rejected".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot approve membership with status 'rejected'");
    }
}
