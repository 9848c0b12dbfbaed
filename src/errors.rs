//! Error handling for the agent trust engine
//!
//! One domain error type covers every service in the crate. Boundary
//! validation, evaluation failures and timeouts are kept distinct so callers
//! can tell a bad request from a backend that may succeed on resubmission.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the trust engine
#[derive(Error, Debug)]
pub enum TrustError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Evaluation failed: {message}")]
    Evaluation { message: String, retryable: bool },

    #[error("Operation timed out: {operation} after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Agent not found: {id}")]
    AgentNotFound { id: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Invalid status transition: {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Database operation failed: {operation} - {source}")]
    Database {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Network operation failed: {operation}")]
    Network {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Mutex lock failed: {resource}")]
    MutexPoisoned { resource: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result alias used throughout the crate
pub type TrustResult<T> = Result<T, TrustError>;

impl TrustError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error for a named request field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Evaluation failure that a resubmission may fix (backend unavailable)
    pub fn evaluation_retryable(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
            retryable: true,
        }
    }

    /// Evaluation failure caused by malformed output or input
    pub fn evaluation_fatal(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn timeout(operation: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms,
        }
    }

    pub fn agent_not_found(id: impl Into<String>) -> Self {
        Self::AgentNotFound { id: id.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn invalid_transition(from: impl Into<String>, event: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            event: event.into(),
        }
    }

    /// Create a database error
    pub fn database(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Create a serialization error
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a network error
    pub fn network(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            operation: operation.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a caller may reasonably resubmit the same request.
    ///
    /// Backend trouble (timeouts, network, unavailable narrator) is
    /// retryable; anything caused by the request itself is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TrustError::Evaluation { retryable, .. } => *retryable,
            TrustError::Timeout { .. } | TrustError::Network { .. } => true,
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TrustError::Validation { .. } => StatusCode::BAD_REQUEST,
            TrustError::AgentNotFound { .. } => StatusCode::NOT_FOUND,
            TrustError::Conflict { .. } | TrustError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            TrustError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            TrustError::Evaluation { retryable: true, .. } => StatusCode::SERVICE_UNAVAILABLE,
            TrustError::Network { .. } => StatusCode::BAD_GATEWAY,
            // Default to 500 for server-side failures
            TrustError::Evaluation { .. }
            | TrustError::Config { .. }
            | TrustError::Database { .. }
            | TrustError::Serialization { .. }
            | TrustError::Io { .. }
            | TrustError::MutexPoisoned { .. }
            | TrustError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TrustError {
    fn into_response(self) -> Response {
        crate::api_errors::AppError::from(self).into_response()
    }
}

/// Helper trait for safe mutex operations
///
/// Lock poisoning becomes a `TrustError` instead of a panic.
pub trait SafeLock<T: ?Sized> {
    fn safe_lock(&self) -> TrustResult<std::sync::MutexGuard<'_, T>>;
}

impl<T: ?Sized> SafeLock<T> for std::sync::Mutex<T> {
    fn safe_lock(&self) -> TrustResult<std::sync::MutexGuard<'_, T>> {
        self.lock().map_err(|_| TrustError::MutexPoisoned {
            resource: "generic_mutex".to_string(),
        })
    }
}

/// Helper trait for safe RwLock read operations
pub trait SafeReadLock<T: ?Sized> {
    fn safe_read(&self) -> TrustResult<std::sync::RwLockReadGuard<'_, T>>;
}

impl<T: ?Sized> SafeReadLock<T> for std::sync::RwLock<T> {
    fn safe_read(&self) -> TrustResult<std::sync::RwLockReadGuard<'_, T>> {
        self.read().map_err(|_| TrustError::MutexPoisoned {
            resource: "rwlock_read".to_string(),
        })
    }
}

/// Helper trait for safe RwLock write operations
pub trait SafeWriteLock<T: ?Sized> {
    fn safe_write(&self) -> TrustResult<std::sync::RwLockWriteGuard<'_, T>>;
}

impl<T: ?Sized> SafeWriteLock<T> for std::sync::RwLock<T> {
    fn safe_write(&self) -> TrustResult<std::sync::RwLockWriteGuard<'_, T>> {
        self.write().map_err(|_| TrustError::MutexPoisoned {
            resource: "rwlock_write".to_string(),
        })
    }
}

/// Convert from sled errors
impl From<sled::Error> for TrustError {
    fn from(err: sled::Error) -> Self {
        TrustError::database("sled_operation", err)
    }
}

/// Convert from serde_json errors
impl From<serde_json::Error> for TrustError {
    fn from(err: serde_json::Error) -> Self {
        TrustError::serialization("json_operation", err)
    }
}

/// Convert from std::io errors
impl From<std::io::Error> for TrustError {
    fn from(err: std::io::Error) -> Self {
        TrustError::io("io_operation", err)
    }
}

/// Convert from reqwest errors
impl From<reqwest::Error> for TrustError {
    fn from(err: reqwest::Error) -> Self {
        TrustError::network("http_request", err)
    }
}

impl From<figment::Error> for TrustError {
    fn from(err: figment::Error) -> Self {
        TrustError::config(err.to_string())
    }
}
