//! # Error Handling
//!
//! Centralized error types for sprig core.
//! Uses `thiserror` for ergonomic error definitions.

use thiserror::Error;

/// Result type alias for sprig operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the sprig runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// The middleware chain ran out of entries and no fallback handler was set
    #[error("No middleware able to handle the request and no fallback handler provided")]
    NoHandler,

    /// A query was refused before reaching the executor
    #[error("Invalid query: {reason}")]
    InvalidQuery {
        /// Why the query was refused
        reason: String,
    },

    /// The executor rejected a statement
    #[error("Query execution failed: {source} (sql: {sql}, params: {params})")]
    Query {
        /// The SQL text that was attempted
        sql: String,
        /// Rendered parameter map
        params: String,
        /// Driver error
        #[source]
        source: sqlx::Error,
    },

    /// Database error
    #[error("Database error: {message}")]
    Database {
        /// Error message from database
        message: String,
    },

    /// An error that maps to a specific HTTP status
    #[error("{message}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Human readable message
        message: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },
}

impl Error {
    /// Build an error carrying an explicit HTTP status
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(400, message)
    }

    /// 401 Unauthorized
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::http(401, message)
    }

    /// 403 Forbidden
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::http(403, message)
    }

    /// 404 Not Found
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(404, message)
    }

    /// 405 Method Not Allowed
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::http(405, message)
    }

    /// 422 Unprocessable Entity
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::http(422, message)
    }

    /// 429 Too Many Requests
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::http(429, message)
    }

    /// 500 Internal Server Error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::http(500, message)
    }

    pub(crate) fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// HTTP status this error should be reported with
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::HttpStatus { status, .. } => *status,
            Self::PayloadTooLarge { .. } => 413,
            _ => 500,
        }
    }
}
