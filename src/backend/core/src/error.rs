//! Error handling for Proofline.
//!
//! Domain errors carry a stable machine-readable code from the fixed
//! taxonomy below plus a human message and optional structured details.
//! The HTTP layer maps codes to status codes mechanically via
//! [`ErrorCode::http_status`]; it never invents codes of its own.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// A specialized Result type for Proofline operations.
pub type Result<T> = std::result::Result<T, Error>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable error codes surfaced in API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    Forbidden,
    ForbiddenAttestationKind,
    LeaseConflict,
    Conflict,
    InvalidTransition,
    ValidationFailed,
    Canceled,
    Internal,
}

impl ErrorCode {
    /// The wire form of this code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::ForbiddenAttestationKind => "forbidden_attestation_kind",
            Self::LeaseConflict => "lease_conflict",
            Self::Conflict => "conflict",
            Self::InvalidTransition => "invalid_transition",
            Self::ValidationFailed => "validation_failed",
            Self::Canceled => "canceled",
            Self::Internal => "internal",
        }
    }

    /// The HTTP status this code maps to.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden | Self::ForbiddenAttestationKind => StatusCode::FORBIDDEN,
            Self::LeaseConflict | Self::Conflict => StatusCode::CONFLICT,
            Self::InvalidTransition | Self::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Canceled | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a caller may retry the operation without changing state first.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LeaseConflict | Self::Conflict)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The domain error type.
#[derive(Error, Debug)]
pub struct Error {
    code: ErrorCode,
    message: Cow<'static, str>,
    details: Option<serde_json::Map<String, serde_json::Value>>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// A bad request rejecting a specific field, with `details.field` set.
    pub fn bad_request_field(field: &str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::BadRequest, message).with_detail("field", field)
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("{entity} not found: {id}"))
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn forbidden_attestation_kind(kind: &str) -> Self {
        Self::new(
            ErrorCode::ForbiddenAttestationKind,
            format!("actor is not authorized to attest kind {kind}"),
        )
        .with_detail("kind", kind)
    }

    pub fn lease_conflict(task_id: &str) -> Self {
        Self::new(
            ErrorCode::LeaseConflict,
            format!("task {task_id} is leased by another actor"),
        )
    }

    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn invalid_transition(from: &str, to: &str) -> Self {
        Self::new(
            ErrorCode::InvalidTransition,
            format!("invalid status transition: {from} -> {to}"),
        )
        .with_detail("from", from)
        .with_detail("to", to)
    }

    pub fn validation_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Attach a structured detail entry.
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.details.as_ref()
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store Error Translation
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => {
                Self::new(ErrorCode::NotFound, "record not found").with_source(err)
            }
            sqlx::Error::Database(db) => {
                let msg = db.message().to_string();
                if msg.contains("UNIQUE constraint failed: leases") {
                    Self::new(ErrorCode::LeaseConflict, "lease already held").with_source(err)
                } else if msg.contains("UNIQUE constraint failed") {
                    Self::conflict("record already exists").with_source(err)
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    Self::new(ErrorCode::NotFound, "referenced record not found").with_source(err)
                } else {
                    Self::internal("database error").with_source(err)
                }
            }
            sqlx::Error::PoolClosed => {
                Self::new(ErrorCode::Canceled, "operation canceled").with_source(err)
            }
            _ => Self::internal("database error").with_source(err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::internal("failed to process JSON data").with_source(err)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP Response Mapping
// ═══════════════════════════════════════════════════════════════════════════════

/// The `{"error": {...}}` envelope returned by every failing request.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Map<String, serde_json::Value>>,
}

impl From<&Error> for ErrorEnvelope {
    fn from(err: &Error) -> Self {
        Self {
            error: ErrorBody {
                code: err.code,
                message: err.message.to_string(),
                details: err.details.clone(),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.code {
            ErrorCode::Internal | ErrorCode::Canceled => {
                tracing::error!(code = %self.code, message = %self.message, source = ?self.source, "request failed");
            }
            _ => {
                tracing::debug!(code = %self.code, message = %self.message, "request rejected");
            }
        }
        // Internal details never reach the client.
        let envelope = if self.code == ErrorCode::Internal {
            ErrorEnvelope {
                error: ErrorBody {
                    code: self.code,
                    message: "internal error".to_string(),
                    details: None,
                },
            }
        } else {
            ErrorEnvelope::from(&self)
        };
        (self.http_status(), Json(envelope)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_http_mapping() {
        assert_eq!(ErrorCode::BadRequest.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::Forbidden.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::ForbiddenAttestationKind.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ErrorCode::LeaseConflict.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::InvalidTransition.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::ValidationFailed.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::Internal.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn retryable_codes() {
        assert!(ErrorCode::LeaseConflict.is_retryable());
        assert!(ErrorCode::Conflict.is_retryable());
        assert!(!ErrorCode::ValidationFailed.is_retryable());
        assert!(!ErrorCode::InvalidTransition.is_retryable());
    }

    #[test]
    fn field_detail_round_trip() {
        let err = Error::bad_request_field("depends_on", "depends_on must not be null");
        let envelope = ErrorEnvelope::from(&err);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"]["code"], "bad_request");
        assert_eq!(json["error"]["details"]["field"], "depends_on");
    }

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(
            ErrorCode::ForbiddenAttestationKind.as_str(),
            "forbidden_attestation_kind"
        );
        assert_eq!(ErrorCode::LeaseConflict.as_str(), "lease_conflict");
        assert_eq!(
            serde_json::to_value(ErrorCode::InvalidTransition).unwrap(),
            "invalid_transition"
        );
    }
}
