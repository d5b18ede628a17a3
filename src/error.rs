//! Request-boundary error taxonomy and its JSON rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// A client input failed validation. Names the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed client input.
    #[error("invalid {}: {}", .0.field, .0.message)]
    Validation(#[from] ValidationError),

    /// The `(list_id, cast_hash)` pair already exists.
    #[error("cast is already in this list")]
    AlreadyInList,

    /// Missing or invalid credential.
    #[error("unauthorized")]
    Unauthorized,

    /// A publish flow was attempted without an FID.
    #[error("no user")]
    NoUser,

    /// A publish flow has no usable (approved) signer or key.
    #[error("no signer")]
    NoSigner,

    #[error("not found: {0}")]
    NotFound(String),

    /// An external service failed; status and body are relayed.
    #[error("{service} returned {status}")]
    Upstream {
        service: &'static str,
        status: u16,
        details: Value,
    },

    /// A required secret or setting is missing.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    pub fn upstream(service: &'static str, status: u16, details: impl Into<Value>) -> Self {
        Self::Upstream {
            service,
            status,
            details: details.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::AlreadyInList => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NoUser | Self::NoSigner => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Config(_) | Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Validation(err) => {
                tracing::debug!(field = err.field, message = %err.message, "validation failed");
                ErrorResponse {
                    ok: false,
                    error: err.message,
                    field: Some(err.field),
                    service: None,
                    details: None,
                }
            }
            Self::AlreadyInList => plain("Cast is already in this list"),
            Self::Unauthorized => plain("unauthorized"),
            Self::NoUser => plain("no_user"),
            Self::NoSigner => plain("no_signer"),
            Self::NotFound(what) => ErrorResponse {
                details: Some(Value::String(what)),
                ..plain("not_found")
            },
            Self::Upstream {
                service,
                status: upstream_status,
                details,
            } => {
                tracing::warn!(service, status = upstream_status, "upstream call failed");
                ErrorResponse {
                    service: Some(service),
                    details: Some(details),
                    ..plain("upstream_error")
                }
            }
            Self::Config(msg) => {
                tracing::error!(error = %msg, "configuration error");
                ErrorResponse {
                    details: Some(Value::String(msg)),
                    ..plain("config_error")
                }
            }
            Self::Unknown(err) => {
                tracing::error!(error = %err, "internal server error");
                plain("internal_error")
            }
        };

        (status, Json(body)).into_response()
    }
}

fn plain(error: &str) -> ErrorResponse {
    ErrorResponse {
        ok: false,
        error: error.to_string(),
        field: None,
        service: None,
        details: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publish_failures_are_forbidden() {
        assert_eq!(AppError::NoUser.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NoSigner.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn upstream_status_is_relayed() {
        let err = AppError::upstream("neynar", 422, json!({"message": "bad"}));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        // A "successful" status cannot be an error response
        let err = AppError::upstream("hub", 200, json!("odd"));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn validation_is_bad_request() {
        let err: AppError = ValidationError::new("text", "Text is required").into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::AlreadyInList.status(), StatusCode::BAD_REQUEST);
    }
}
