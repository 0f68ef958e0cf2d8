//! Error taxonomy for the telemetry core.
//!
//! Each component reports its own `thiserror` enum. The operations exposed by
//! [`crate::TelemetryService`] fold them into [`ServiceError`], whose
//! [`ErrorCategory`] is what the transport layer branches on.

use thiserror::Error;

use crate::config_store::ConfigError;
use crate::decoder::DecodeError;
use crate::export::ExportError;
use crate::schema::SchemaError;
use crate::store::StoreError;

// ---

/// Coarse classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller sent something unacceptable. Never retried.
    ClientInput,
    /// The record id already exists.
    Conflict,
    /// Server fault. The cause is logged, not echoed.
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("structural decode error: {0}")]
    StructuralDecode(String),

    #[error("invalid configuration payload: {0}")]
    InvalidPayload(String),

    #[error("record '{0}' already exists")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn category(&self) -> ErrorCategory {
        // ---
        match self {
            ServiceError::Malformed(_)
            | ServiceError::SchemaViolation(_)
            | ServiceError::StructuralDecode(_)
            | ServiceError::InvalidPayload(_) => ErrorCategory::ClientInput,
            ServiceError::Conflict(_) => ErrorCategory::Conflict,
            ServiceError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        // ---
        match self {
            ServiceError::Malformed(_) => "malformed",
            ServiceError::SchemaViolation(_) => "schema_violation",
            ServiceError::StructuralDecode(_) => "structural_decode",
            ServiceError::InvalidPayload(_) => "invalid_payload",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<SchemaError> for ServiceError {
    fn from(e: SchemaError) -> Self {
        // ---
        match e {
            SchemaError::Malformed(msg) => ServiceError::Malformed(msg),
            SchemaError::Violation(msg) => ServiceError::SchemaViolation(msg),
            SchemaError::Unavailable => ServiceError::Internal(e.to_string()),
        }
    }
}

impl From<DecodeError> for ServiceError {
    fn from(e: DecodeError) -> Self {
        ServiceError::StructuralDecode(e.to_string())
    }
}

impl From<ConfigError> for ServiceError {
    fn from(e: ConfigError) -> Self {
        // ---
        match e {
            ConfigError::InvalidPayload(msg) => ServiceError::InvalidPayload(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        // ---
        match e {
            StoreError::Conflict(id) => ServiceError::Conflict(id),
            StoreError::InvalidId(_) => ServiceError::StructuralDecode(e.to_string()),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<ExportError> for ServiceError {
    fn from(e: ExportError) -> Self {
        ServiceError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_categories() {
        // ---
        assert_eq!(
            ServiceError::Malformed("x".into()).category(),
            ErrorCategory::ClientInput
        );
        assert_eq!(
            ServiceError::InvalidPayload("x".into()).category(),
            ErrorCategory::ClientInput
        );
        assert_eq!(
            ServiceError::Conflict("L01".into()).category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            ServiceError::Internal("x".into()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_schema_unavailable_is_internal() {
        // ---
        let err = ServiceError::from(SchemaError::Unavailable);
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert_eq!(err.kind(), "internal");
    }

    #[test]
    fn test_store_conflict_keeps_id() {
        // ---
        let err = ServiceError::from(StoreError::Conflict("L01".into()));
        assert_eq!(err.kind(), "conflict");
        assert_eq!(err.to_string(), "record 'L01' already exists");
    }
}
