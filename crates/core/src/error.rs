//! Error types for the AvatarChat core

use thiserror::Error;

/// Result type alias for AvatarChat core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while building or running a chat session
#[derive(Debug, Error)]
pub enum Error {
    /// Engine or handler configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Two handlers were registered under the same name
    #[error("Duplicate handler name: {name}")]
    DuplicateHandler {
        /// Offending handler name
        name: String,
    },

    /// No factory is registered for a handler type
    #[error("Unknown handler type '{handler_type}'. Available: {available:?}")]
    UnknownHandlerType {
        /// Requested handler type
        handler_type: String,
        /// Registered handler types
        available: Vec<String>,
    },

    /// Attempt to mutate a definition after `lockdown()`
    #[error("Data bundle definition is locked")]
    DefinitionLocked,

    /// Entry name already present in a definition
    #[error("Duplicate data bundle entry: {name}")]
    DuplicateEntry {
        /// Entry name
        name: String,
    },

    /// Entry name not present in a definition
    #[error("Unknown data bundle entry: {name}")]
    UnknownEntry {
        /// Entry name
        name: String,
    },

    /// Array shape does not match the entry definition
    #[error("Shape mismatch for entry '{entry}': expected {expected}, got {actual:?}")]
    ShapeMismatch {
        /// Entry name
        entry: String,
        /// Allowed shape, formatted
        expected: String,
        /// Shape that was written
        actual: Vec<usize>,
    },

    /// Invalid input data (type mismatch, malformed definition)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A handler produced a result that cannot be turned into an envelope
    #[error("Unsupported output from handler '{handler}': {reason}")]
    UnsupportedOutput {
        /// Producing handler
        handler: String,
        /// Why the result was rejected
        reason: String,
    },

    /// A session with the same id already exists
    #[error("Session already exists: {session_id}")]
    SessionExists {
        /// Session id
        session_id: String,
    },

    /// Session lookup failed
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// Session id
        session_id: String,
    },

    /// Operation not valid in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Handler or pipeline execution error
    #[error("Execution error: {0}")]
    Execution(String),

    /// Circuit breaker is open (too many failures)
    #[error("Circuit breaker open for {component}: {reason}")]
    CircuitBreakerOpen {
        /// Guarded component
        component: String,
        /// Reason for circuit breaker activation
        reason: String,
    },

    /// Audio resampling error
    #[error("Resample error: {0}")]
    Resample(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

#[cfg(feature = "avatar")]
impl From<rubato::ResamplerConstructionError> for Error {
    fn from(err: rubato::ResamplerConstructionError) -> Self {
        Error::Resample(err.to_string())
    }
}

#[cfg(feature = "avatar")]
impl From<rubato::ResampleError> for Error {
    fn from(err: rubato::ResampleError) -> Self {
        Error::Resample(err.to_string())
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Error::InvalidData(err.to_string())
    }
}
