//! Error types for the best-path decoder.
//!
//! A single `thiserror` enum covers the three failure classes a decode can hit:
//! bad configuration at construction, violated preconditions at call time,
//! and fatal compute-backend faults. A call either succeeds for every batch
//! element or returns one of these for the whole call.

use thiserror::Error;

/// Primary error type for the crate.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Invalid decoder configuration (non-positive sizes, unknown strategy).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input that does not match the configured shapes.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Score tensor dimensions differ from the decoder's.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// (batch_size, classes including blank, max_t) the decoder was built for.
        expected: [usize; 3],
        /// Dimensions supplied by the caller.
        actual: [usize; 3],
    },

    /// Unrecoverable compute backend fault (allocation, dispatch, transfer).
    #[error("Backend error ({backend}): {message}")]
    Backend {
        /// Name of the backend that failed.
        backend: String,
        /// What went wrong.
        message: String,
    },
}

impl DecodeError {
    /// Build a backend error.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        DecodeError::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Short, stable name of the error class, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Configuration(_) => "configuration",
            DecodeError::InvalidInput(_) => "invalid_input",
            DecodeError::ShapeMismatch { .. } => "shape_mismatch",
            DecodeError::Backend { .. } => "backend",
        }
    }

    /// Whether the error was raised before any work was dispatched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            DecodeError::Configuration(_)
                | DecodeError::InvalidInput(_)
                | DecodeError::ShapeMismatch { .. }
        )
    }
}

/// Convenience type alias for Results with DecodeError.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Extension trait for adding context to foreign errors.
pub trait ErrorContext<T> {
    /// Add context to the error.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to the error.
    fn with_static_context(self, context: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| DecodeError::InvalidInput(format!("{}: {}", f(), e)))
    }

    fn with_static_context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| DecodeError::InvalidInput(format!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(DecodeError::Configuration("x".into()).is_precondition());
        assert!(DecodeError::ShapeMismatch {
            expected: [1, 3, 2],
            actual: [1, 3, 4]
        }
        .is_precondition());
        assert!(!DecodeError::backend("cpu", "worker panicked").is_precondition());
        assert_eq!(DecodeError::backend("cpu", "x").kind(), "backend");
    }

    #[test]
    fn test_backend_error_message() {
        let err = DecodeError::backend("cpu", "read before allocate");
        assert_eq!(err.to_string(), "Backend error (cpu): read before allocate");
    }

    #[test]
    fn test_with_context_wraps_message() {
        let parsed: std::result::Result<i32, std::num::ParseIntError> = "abc".parse::<i32>();
        let err = parsed.with_context(|| "parsing worker count".to_string()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidInput(_)));
        assert!(err.to_string().contains("parsing worker count"));
    }
}
