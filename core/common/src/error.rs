//! Common error types for the file engine.

use thiserror::Error;

/// Top-level error type for file engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Path normalization crossed the configured root.
    #[error("Path outside root: {0}")]
    PathOutsideRoot(String),

    /// An empty path was given where a named target is required.
    #[error("Path is empty")]
    PathEmpty,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backing store (disk, object store) failed.
    #[error("Backend unavailable during {operation} on {path}: {message}")]
    BackendUnavailable {
        operation: &'static str,
        path: String,
        message: String,
    },

    /// The authorization resolver denied the request.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// No valid credential was presented.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Task type has no registered handler.
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// ACL store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Task queue transport failed.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport-neutral error classes exposed at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    /// Retryable; the client decides whether to try again.
    Unavailable,
    Internal,
}

impl Error {
    /// Wrap a backend failure with the operation and logical path.
    pub fn backend(operation: &'static str, path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::BackendUnavailable {
            operation,
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Classify this error for the transport layer.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::PathOutsideRoot(_) | Error::PathEmpty | Error::InvalidInput(_) => {
                ErrorCode::InvalidArgument
            }
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::AlreadyExists(_) => ErrorCode::AlreadyExists,
            // ACL store failures fail closed.
            Error::PermissionDenied(_) | Error::Store(_) => ErrorCode::PermissionDenied,
            Error::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Error::BackendUnavailable { .. } | Error::Queue(_) | Error::Io(_) => {
                ErrorCode::Unavailable
            }
            Error::UnknownTaskType(_) | Error::Serialization(_) | Error::Config(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// Whether the client may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable { .. } | Error::Queue(_) | Error::Io(_)
        )
    }

    /// Message safe to hand to an untrusted client.
    ///
    /// Never contains backend error text or host filesystem paths.
    pub fn public_message(&self) -> String {
        match self.code() {
            ErrorCode::InvalidArgument => match self {
                Error::PathOutsideRoot(_) => "path outside root".to_string(),
                Error::PathEmpty => "path is empty".to_string(),
                Error::InvalidInput(msg) => format!("invalid input: {}", msg),
                _ => "invalid argument".to_string(),
            },
            ErrorCode::NotFound => "not found".to_string(),
            ErrorCode::AlreadyExists => "already exists".to_string(),
            ErrorCode::PermissionDenied => "access denied".to_string(),
            ErrorCode::Unauthenticated => "unauthenticated".to_string(),
            ErrorCode::Unavailable => match self {
                Error::BackendUnavailable { operation, .. } => {
                    format!("storage unavailable during {}", operation)
                }
                _ => "service unavailable".to_string(),
            },
            ErrorCode::Internal => match self {
                Error::UnknownTaskType(kind) => format!("unknown task type: {}", kind),
                _ => "internal error".to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
