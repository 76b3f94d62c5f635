//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{DomainError, Notification};
use crate::email::RelayError;
use crate::maintenance::MaintenanceError;
use crate::profile::ProfileError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing or malformed session token")]
    MissingSession,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("The system is under maintenance")]
    UnderMaintenance,

    // Profile pipeline outcomes, with the notifications raised on the way
    #[error("{source}")]
    Profile {
        source: ProfileError,
        notifications: Vec<Notification>,
    },

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AppError {
    pub fn profile(source: ProfileError, notifications: Vec<Notification>) -> Self {
        Self::Profile {
            source,
            notifications,
        }
    }
}

impl From<ProfileError> for AppError {
    fn from(source: ProfileError) -> Self {
        Self::profile(source, Vec::new())
    }
}

impl From<MaintenanceError> for AppError {
    fn from(err: MaintenanceError) -> Self {
        match err {
            MaintenanceError::Database(e) => Self::Database(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<crate::audit::AuditLogError> for AppError {
    fn from(err: crate::audit::AuditLogError) -> Self {
        match err {
            crate::audit::AuditLogError::Database(e) => Self::Database(e),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<Notification>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 401 Unauthorized
            AppError::MissingSession => {
                (StatusCode::UNAUTHORIZED, "missing_session", None)
            }

            // 403 Forbidden
            AppError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone()))
            }

            // 503 Service Unavailable
            AppError::UnderMaintenance => {
                (StatusCode::SERVICE_UNAVAILABLE, "maintenance_mode", None)
            }

            AppError::Profile { source, .. } => match source {
                ProfileError::Unauthenticated => {
                    (StatusCode::UNAUTHORIZED, "session_expired", None)
                }
                ProfileError::Fetch(e) => {
                    tracing::error!(error = %e, "Profile query failed");
                    (StatusCode::SERVICE_UNAVAILABLE, "profile_fetch_failed", Some(e.operation.to_string()))
                }
                ProfileError::Exhausted { attempts, .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "profile_unavailable", Some(format!("{} attempts", attempts)))
                }
            },

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => {
                if domain_err.is_lookup_miss() {
                    tracing::info!(error = %domain_err, "Requested member does not exist");
                } else {
                    tracing::debug!(error = %domain_err, "Request rejected");
                }
                match domain_err {
                    DomainError::InvalidMemberNumber => {
                        (StatusCode::BAD_REQUEST, "invalid_member_number", None)
                    }
                    DomainError::InvalidEmail(email) => {
                        (StatusCode::BAD_REQUEST, "invalid_email", Some(email.clone()))
                    }
                    DomainError::MemberNotFound(id) => {
                        (StatusCode::NOT_FOUND, "member_not_found", Some(id.clone()))
                    }
                    DomainError::EmailMismatch => {
                        (StatusCode::BAD_REQUEST, "email_mismatch", None)
                    }
                    DomainError::ImmutableField(field) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "immutable_field", Some(field.to_string()))
                    }
                    DomainError::BlankField(field) => {
                        (StatusCode::BAD_REQUEST, "blank_field", Some(field.to_string()))
                    }
                    DomainError::NoChanges => {
                        (StatusCode::BAD_REQUEST, "no_changes", None)
                    }
                    DomainError::InvalidSortField(field) => {
                        (StatusCode::BAD_REQUEST, "invalid_sort_field", Some(field.clone()))
                    }
                    DomainError::CollectorRequired => {
                        (StatusCode::FORBIDDEN, "collector_required", None)
                    }
                }
            }

            AppError::Relay(relay_err) => match relay_err {
                RelayError::RateLimited { limit } => {
                    (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", Some(format!("{} emails per hour", limit)))
                }
                RelayError::Invalid(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_email", Some(msg.clone()))
                }
                RelayError::Database(e) => {
                    tracing::error!("Email relay database error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
                }
            },

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let error = match &self {
            // Server-side detail stays in the logs
            AppError::Database(_) | AppError::Relay(RelayError::Database(_)) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let notifications = match self {
            AppError::Profile { notifications, .. } => notifications,
            _ => Vec::new(),
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
            notifications,
        };

        (status, Json(body)).into_response()
    }
}
