use thiserror::Error;

/// Failure inside a handler body. Aborts the rest of the pipeline for the
/// document it was raised for.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{reference}: cannot read content: {source}")]
    Io {
        reference: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{reference}: script execution failed ({engine}): {message}")]
    Script {
        reference: String,
        engine: String,
        message: String,
    },

    #[error("{reference}: handler timed out")]
    Timeout { reference: String },

    #[error("{reference}: {message}")]
    Internal { reference: String, message: String },
}

impl HandlerError {
    pub fn reference(&self) -> &str {
        match self {
            Self::Io { reference, .. }
            | Self::Script { reference, .. }
            | Self::Timeout { reference }
            | Self::Internal { reference, .. } => reference,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn should_retry(&self) -> bool {
        match self {
            // Temporary errors - retry
            Self::Io { .. } => true,
            Self::Timeout { .. } => true,

            // Fatal errors - don't retry
            Self::Script { .. } => false,
            Self::Internal { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_retriable() {
        let err = HandlerError::Timeout {
            reference: "doc-1".into(),
        };
        assert!(err.is_timeout());
        assert!(err.should_retry());
        assert_eq!(err.reference(), "doc-1");
        assert_eq!(err.to_string(), "doc-1: handler timed out");
    }

    #[test]
    fn test_script_error_is_fatal() {
        let err = HandlerError::Script {
            reference: "doc-2".into(),
            engine: "rhai".into(),
            message: "boom".into(),
        };
        assert!(!err.is_timeout());
        assert!(!err.should_retry());
        assert_eq!(
            err.to_string(),
            "doc-2: script execution failed (rhai): boom"
        );
    }
}
