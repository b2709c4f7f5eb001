use crate::schema::{SchemaId, SchemaType};

/// Error returned by envelope, cache and client operations.
#[derive(Debug, thiserror::Error)]
pub enum SrError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("schema {0} not found")]
    SchemaNotFound(SchemaId),

    #[error("schema registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("schema {id} has type {actual}, expected {expected}")]
    SchemaTypeMismatch {
        id: SchemaId,
        expected: SchemaType,
        actual: SchemaType,
    },

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl SrError {
    /// Stable machine-readable code, reported to the host verbatim.
    pub fn code(&self) -> &'static str {
        match self {
            SrError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            SrError::SchemaNotFound(_) => "SCHEMA_NOT_FOUND",
            SrError::RegistryUnavailable(_) => "REGISTRY_UNAVAILABLE",
            SrError::SchemaTypeMismatch { .. } => "SCHEMA_TYPE_MISMATCH",
            SrError::Payload(_) => "PAYLOAD_ERROR",
        }
    }
}
