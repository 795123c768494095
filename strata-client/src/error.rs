//! Error types for the Strata HTTP clients
//!
//! `ClientError` describes what went wrong on the wire. The engine never sees
//! it directly: it is mapped onto `ReconcileError` or `AuthError` at the trait
//! boundary.

use strata_core::dto::backend::BackendErrorBody;
use strata_core::dto::token::TokenErrorResponse;
use strata_core::error::{AuthError, AuthFailure, ReconcileError, ReconcileFailure};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to an external collaborator
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed (connect, timeout, TLS...)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Remote returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Raw response body
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Maps a provisioning backend failure onto the reconcile taxonomy
    ///
    /// The backend's JSON error code wins; the status code is the fallback.
    pub fn into_reconcile_error(self) -> ReconcileError {
        match self {
            ClientError::RequestFailed(e) => ReconcileError::unreachable(e.to_string()),
            ClientError::ParseError(msg) => ReconcileError::unreachable(msg),
            ClientError::ApiError { status, message } => {
                let body = serde_json::from_str::<BackendErrorBody>(&message).ok();
                let reason = body
                    .as_ref()
                    .and_then(|b| reconcile_reason_from_code(&b.code))
                    .unwrap_or_else(|| reconcile_reason_from_status(status));
                let detail = match body {
                    Some(b) if !b.message.is_empty() => format!("{} ({})", b.message, b.code),
                    Some(b) => b.code,
                    None => format!("status {}: {}", status, message),
                };
                ReconcileError::new(reason, detail)
            }
        }
    }

    /// Maps an identity provider failure onto the auth taxonomy
    pub fn into_auth_error(self) -> AuthError {
        match self {
            ClientError::RequestFailed(e) => {
                AuthError::new(AuthFailure::IssuerUnreachable, e.to_string())
            }
            ClientError::ParseError(msg) => AuthError::new(AuthFailure::IssuerUnreachable, msg),
            ClientError::ApiError { status, message } => {
                let body = serde_json::from_str::<TokenErrorResponse>(&message).ok();
                let reason = body
                    .as_ref()
                    .and_then(|b| auth_reason_from_code(&b.error))
                    .unwrap_or_else(|| auth_reason_from_status(status));
                let detail = match body {
                    Some(b) => match b.error_description {
                        Some(desc) => format!("{}: {}", b.error, desc),
                        None => b.error,
                    },
                    None => format!("status {}: {}", status, message),
                };
                AuthError::new(reason, detail)
            }
        }
    }
}

fn reconcile_reason_from_code(code: &str) -> Option<ReconcileFailure> {
    match code {
        "Conflict" | "PreconditionFailed" | "ConcurrentModification" => {
            Some(ReconcileFailure::Conflict)
        }
        "QuotaExceeded" => Some(ReconcileFailure::QuotaExceeded),
        "InvalidDesiredState" | "ValidationError" | "BadRequest" => {
            Some(ReconcileFailure::InvalidDesiredState)
        }
        "Unauthorized" | "Forbidden" => Some(ReconcileFailure::Unauthorized),
        "ServiceUnavailable" => Some(ReconcileFailure::BackendUnreachable),
        _ => None,
    }
}

fn reconcile_reason_from_status(status: u16) -> ReconcileFailure {
    match status {
        409 | 412 => ReconcileFailure::Conflict,
        401 | 403 => ReconcileFailure::Unauthorized,
        // Throttling is transient
        429 => ReconcileFailure::BackendUnreachable,
        400..=499 => ReconcileFailure::InvalidDesiredState,
        _ => ReconcileFailure::BackendUnreachable,
    }
}

fn auth_reason_from_code(code: &str) -> Option<AuthFailure> {
    match code {
        "invalid_scope" => Some(AuthFailure::ScopeDenied),
        "invalid_client" | "invalid_grant" | "unauthorized_client" | "invalid_request" => {
            Some(AuthFailure::AssertionRejected)
        }
        "temporarily_unavailable" | "server_error" => Some(AuthFailure::IssuerUnreachable),
        _ => None,
    }
}

fn auth_reason_from_status(status: u16) -> AuthFailure {
    match status {
        403 => AuthFailure::ScopeDenied,
        400..=499 => AuthFailure::AssertionRejected,
        _ => AuthFailure::IssuerUnreachable,
    }
}
