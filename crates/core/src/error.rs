//! Error types shared across the engine.

use crate::types::DbId;

/// Domain-level error for operations outside job execution.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A domain-attributable pipeline failure.
///
/// A job whose execution returns this error reaches the `failed` terminal
/// state with the message appended to its log. The optional `code` carries
/// the exit code of the external command that caused the failure.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProcessingError {
    message: String,
    code: Option<i32>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            source: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
            source: None,
        }
    }

    /// Wrap an unexpected error so that the job still reaches a terminal
    /// state. The original error is retained as the source.
    pub fn wrap(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: "An error occurred during job processing.".to_string(),
            code: None,
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_error_carries_code() {
        let err = ProcessingError::with_code("Unable to call variants", 106);
        assert_eq!(err.message(), "Unable to call variants");
        assert_eq!(err.code(), Some(106));
    }

    #[test]
    fn wrapped_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = ProcessingError::wrap(io);
        assert_eq!(err.message(), "An error occurred during job processing.");
        assert!(std::error::Error::source(&err).is_some());
    }
}
