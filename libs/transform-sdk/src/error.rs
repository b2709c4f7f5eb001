use std::fmt;

use transform_sr::SrError;

/// Opaque error raised by user transform code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure category. The string form is what operators see in host reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MalformedEnvelope,
    MalformedBatch,
    SchemaNotFound,
    RegistryUnavailable,
    OutputLimitExceeded,
    CallbackAlreadyRegistered,
    CallbackNotRegistered,
    CallbackError,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedEnvelope => "MALFORMED_ENVELOPE",
            ErrorKind::MalformedBatch => "MALFORMED_BATCH",
            ErrorKind::SchemaNotFound => "SCHEMA_NOT_FOUND",
            ErrorKind::RegistryUnavailable => "REGISTRY_UNAVAILABLE",
            ErrorKind::OutputLimitExceeded => "OUTPUT_LIMIT_EXCEEDED",
            ErrorKind::CallbackAlreadyRegistered => "CALLBACK_ALREADY_REGISTERED",
            ErrorKind::CallbackNotRegistered => "CALLBACK_NOT_REGISTERED",
            ErrorKind::CallbackError => "CALLBACK_ERROR",
            ErrorKind::Config => "CONFIG",
        }
    }

    /// Status returned across the ABI. Zero is reserved for success.
    pub fn status_code(&self) -> i32 {
        match self {
            ErrorKind::MalformedEnvelope => -1,
            ErrorKind::MalformedBatch => -2,
            ErrorKind::SchemaNotFound => -3,
            ErrorKind::RegistryUnavailable => -4,
            ErrorKind::OutputLimitExceeded => -5,
            ErrorKind::CallbackAlreadyRegistered => -6,
            ErrorKind::CallbackNotRegistered => -7,
            ErrorKind::CallbackError => -8,
            ErrorKind::Config => -9,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    #[error("record {position}: {source}")]
    Callback { position: usize, source: BoxError },

    #[error("record {position}: emitted {emitted} records, limit is {limit}")]
    OutputLimitExceeded {
        position: usize,
        emitted: usize,
        limit: usize,
    },

    #[error("a transform callback is already registered")]
    CallbackAlreadyRegistered,

    #[error("no transform callback registered")]
    CallbackNotRegistered,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Registry(#[from] SrError),
}

impl TransformError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedBatch(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformError::MalformedBatch(_) => ErrorKind::MalformedBatch,
            TransformError::Callback { .. } => ErrorKind::CallbackError,
            TransformError::OutputLimitExceeded { .. } => ErrorKind::OutputLimitExceeded,
            TransformError::CallbackAlreadyRegistered => ErrorKind::CallbackAlreadyRegistered,
            TransformError::CallbackNotRegistered => ErrorKind::CallbackNotRegistered,
            TransformError::Config(_) => ErrorKind::Config,
            TransformError::Registry(e) => match e {
                SrError::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
                SrError::SchemaNotFound(_) => ErrorKind::SchemaNotFound,
                SrError::RegistryUnavailable(_) => ErrorKind::RegistryUnavailable,
                SrError::SchemaTypeMismatch { .. } | SrError::Payload(_) => {
                    ErrorKind::CallbackError
                }
            },
        }
    }

    /// For callback failures caused by a registry error, that error's code.
    pub fn registry_cause(&self) -> Option<&'static str> {
        match self {
            TransformError::Callback { source, .. } => {
                source.downcast_ref::<SrError>().map(SrError::code)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use transform_sr::SchemaId;

    use super::*;

    #[test]
    fn registry_errors_inside_callbacks_stay_callback_errors() {
        let err = TransformError::Callback {
            position: 1,
            source: Box::new(SrError::SchemaNotFound(SchemaId(7))),
        };
        assert_eq!(err.kind(), ErrorKind::CallbackError);
        assert_eq!(err.registry_cause(), Some("SCHEMA_NOT_FOUND"));
        assert_eq!(err.to_string(), "record 1: schema 7 not found");
    }

    #[test]
    fn opaque_callback_error_has_no_cause() {
        let err = TransformError::Callback {
            position: 0,
            source: "bad input".into(),
        };
        assert_eq!(err.registry_cause(), None);
    }

    #[test]
    fn status_codes_are_distinct_and_negative() {
        let kinds = [
            ErrorKind::MalformedEnvelope,
            ErrorKind::MalformedBatch,
            ErrorKind::SchemaNotFound,
            ErrorKind::RegistryUnavailable,
            ErrorKind::OutputLimitExceeded,
            ErrorKind::CallbackAlreadyRegistered,
            ErrorKind::CallbackNotRegistered,
            ErrorKind::CallbackError,
            ErrorKind::Config,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(ErrorKind::status_code).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }
}
