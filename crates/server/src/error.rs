//! Event and API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tandem_cache::CacheError;
use tandem_core::event::{ListSnapshot, OutboundEvent};
use tandem_core::rev::Rev;
use tandem_core::validate::FieldError;
use tandem_repository::RepositoryError;

/// Error raised while handling one inbound socket event.
///
/// Every variant maps onto the client-visible error taxonomy via
/// [`EventError::kind`] and [`EventError::into_events`]; the session stays
/// open for all of them except the auth failure on the handshake itself.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid payload")]
    Validation(Vec<FieldError>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("revision conflict: client rev {client} behind server rev {current}")]
    RevisionConflict {
        client: Rev,
        current: Rev,
        /// Authoritative state, delivered alongside the error.
        snapshot: Box<ListSnapshot>,
    },

    #[error("transient error: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EventError {
    /// Taxonomy kind for metrics and the wire `kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth_error",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::RevisionConflict { .. } => "revision_conflict",
            Self::Transient(_) => "transient_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Outbound events delivered to the offending session. A revision
    /// conflict carries the authoritative snapshot before the error so the
    /// client can reconcile; internal details never leave the server.
    pub fn into_events(self) -> Vec<OutboundEvent> {
        match self {
            Self::Auth(message) => vec![OutboundEvent::AuthError { message }],
            Self::PermissionDenied(message) => {
                vec![OutboundEvent::PermissionError { message }]
            }
            Self::Validation(errors) => vec![OutboundEvent::ValidationError {
                message: "invalid payload".to_string(),
                errors,
            }],
            Self::NotFound(message) => vec![OutboundEvent::Error {
                message,
                kind: Some("not_found".to_string()),
            }],
            Self::RevisionConflict {
                client,
                current,
                snapshot,
            } => vec![
                OutboundEvent::ListSnapshot(*snapshot),
                OutboundEvent::Error {
                    message: format!(
                        "out of sync: client rev {client}, server rev {current}"
                    ),
                    kind: Some("revision_conflict".to_string()),
                },
            ],
            Self::Transient(message) => vec![OutboundEvent::Error {
                message,
                kind: Some("transient_error".to_string()),
            }],
            Self::Internal(_) => vec![OutboundEvent::Error {
                message: "internal error".to_string(),
                kind: Some("internal_error".to_string()),
            }],
        }
    }
}

impl From<CacheError> for EventError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::ListNotFound => Self::NotFound("list not found".to_string()),
            CacheError::ItemNotFound => Self::NotFound("item not found".to_string()),
            CacheError::Timeout(d) => {
                Self::Transient(format!("shared store timed out after {d:?}"))
            }
            CacheError::Redis(e) => Self::Transient(format!("shared store error: {e}")),
            CacheError::Decode(message) => Self::Internal(message),
        }
    }
}

impl From<RepositoryError> for EventError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(message) => Self::NotFound(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Error response for the operational HTTP endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Operational endpoint errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("internal error: {0}")]
    Internal(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Internal(_) => "internal_error",
            Self::Unavailable(_) => "unavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for operational handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    #[test]
    fn revision_conflict_yields_snapshot_then_error() {
        let err = EventError::RevisionConflict {
            client: "80.000000".parse().unwrap(),
            current: "100.000000".parse().unwrap(),
            snapshot: Box::new(ListSnapshot {
                list_id: Uuid::new_v4(),
                list_name: "Groceries".to_string(),
                items: HashMap::new(),
                rev: "100.000000".parse().unwrap(),
            }),
        };
        assert_eq!(err.kind(), "revision_conflict");

        let events = err.into_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "list_snapshot");
        assert_eq!(events[1].name(), "error");
    }

    #[test]
    fn internal_details_stay_server_side() {
        let events = EventError::Internal("sqlx blew up at row 7".to_string()).into_events();
        match &events[0] {
            OutboundEvent::Error { message, kind } => {
                assert_eq!(message, "internal error");
                assert_eq!(kind.as_deref(), Some("internal_error"));
            }
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[test]
    fn cache_errors_map_to_taxonomy() {
        assert_eq!(
            EventError::from(CacheError::ListNotFound).kind(),
            "not_found"
        );
        assert_eq!(
            EventError::from(CacheError::Timeout(std::time::Duration::from_secs(2))).kind(),
            "transient_error"
        );
    }
}
