//! Unified error handling for the raceline core.
//!
//! Replaces ad-hoc Option/panic/silent-failure patterns with a single error
//! type whose variants map onto the taxonomy the correction pipeline needs:
//! input rejected before any state changes, a missing lookup, a transient
//! store failure the pipeline can route around, or an internal bug.

use std::fmt;

/// Unified error type for core operations.
#[derive(Debug, Clone)]
pub enum CoreError {
    /// Request failed validation before any state was touched.
    InvalidInput { message: String },
    /// A required lookup (route, participant state) was absent.
    NotFound { key: String },
    /// An external store call failed or timed out; caller may degrade and continue.
    Transient { message: String },
    /// Programming error or invariant violation. Detail is logged, never surfaced.
    Internal { message: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InvalidInput { message } => write!(f, "invalid input: {}", message),
            CoreError::NotFound { key } => write!(f, "not found: {}", key),
            CoreError::Transient { message } => write!(f, "transient error: {}", message),
            CoreError::Internal { .. } => write!(f, "internal error"),
        }
    }
}

impl std::error::Error for CoreError {}

impl CoreError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        CoreError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        CoreError::NotFound { key: key.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        CoreError::Transient {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CoreError::Internal {
            message: message.into(),
        }
    }

    /// True for errors that the correction pipeline may recover from by
    /// degrading the response rather than failing the whole call.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CoreError::Transient { .. } | CoreError::NotFound { .. })
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Extension trait for converting `Option` into a `CoreError` at call boundaries.
pub trait OptionExt<T> {
    fn ok_or_invalid(self, message: &str) -> Result<T>;
    fn ok_or_not_found(self, key: &str) -> Result<T>;
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid(self, message: &str) -> Result<T> {
        self.ok_or_else(|| CoreError::invalid_input(message))
    }

    fn ok_or_not_found(self, key: &str) -> Result<T> {
        self.ok_or_else(|| CoreError::not_found(key))
    }

    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| CoreError::internal(message))
    }
}
