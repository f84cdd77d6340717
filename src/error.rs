//! Connection and stream error types.
//!
//! Errors are classified up front so the retry policy can gate on
//! [`ConnectionError::is_retryable`] without inspecting `reqwest` internals
//! at every call site.

use std::fmt;

/// Errors raised while connecting to or reading the analysis stream.
#[derive(Debug, Clone)]
pub enum ConnectionError {
    /// Connection to the backend failed.
    ConnectionFailed { url: String, message: String },

    /// Request or read timed out.
    Timeout {
        operation: String,
        message: String,
    },

    /// HTTP status error (non-2xx response).
    HttpStatus { status: u16, message: String },

    /// The response body could not be read.
    Transport { message: String },

    /// The stream was cancelled locally. Benign; never surfaced as a failure.
    Cancelled,

    /// Generic connection error.
    Other { message: String },
}

impl ConnectionError {
    /// Check if this error is likely transient and can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectionError::ConnectionFailed { .. } => true,
            ConnectionError::Timeout { .. } => true,
            ConnectionError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            ConnectionError::Transport { .. } => false,
            ConnectionError::Cancelled => false,
            ConnectionError::Other { .. } => false,
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            ConnectionError::ConnectionFailed { .. } => {
                "Unable to connect to the analysis server. Please check your internet connection."
                    .to_string()
            }
            ConnectionError::Timeout { operation, .. } => {
                format!(
                    "The {} operation timed out. The server may be slow or unreachable.",
                    operation
                )
            }
            ConnectionError::HttpStatus { status, .. } => match *status {
                400 => "The request was invalid. Please try again.".to_string(),
                401 => "Authentication required. Please sign in again.".to_string(),
                429 => "Too many requests. Please wait a moment and try again.".to_string(),
                500..=599 => {
                    "The server is experiencing issues. Please try again later.".to_string()
                }
                _ => format!(
                    "The server returned an error (HTTP {}). Please try again.",
                    status
                ),
            },
            ConnectionError::Transport { .. } => {
                "The connection to the server was interrupted. Please try again.".to_string()
            }
            ConnectionError::Cancelled => "The analysis was cancelled.".to_string(),
            ConnectionError::Other { message } => {
                format!("Connection error: {}", message)
            }
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectionError::ConnectionFailed { .. } => "E_CONN_FAILED",
            ConnectionError::Timeout { .. } => "E_CONN_TIMEOUT",
            ConnectionError::HttpStatus { .. } => "E_CONN_HTTP",
            ConnectionError::Transport { .. } => "E_CONN_TRANSPORT",
            ConnectionError::Cancelled => "E_CONN_CANCEL",
            ConnectionError::Other { .. } => "E_CONN_OTHER",
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed { url, message } => {
                write!(f, "Connection failed to '{}': {}", url, message)
            }
            ConnectionError::Timeout { operation, message } => {
                write!(f, "{} timed out: {}", operation, message)
            }
            ConnectionError::HttpStatus { status, message } => {
                write!(f, "HTTP {} error: {}", status, message)
            }
            ConnectionError::Transport { message } => {
                write!(f, "Stream transport error: {}", message)
            }
            ConnectionError::Cancelled => {
                write!(f, "Stream cancelled")
            }
            ConnectionError::Other { message } => {
                write!(f, "Connection error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

/// Classify a reqwest error into a ConnectionError.
pub fn classify_reqwest_error(err: &reqwest::Error, url: &str) -> ConnectionError {
    if err.is_connect() {
        ConnectionError::ConnectionFailed {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else if err.is_timeout() {
        ConnectionError::Timeout {
            operation: "HTTP request".to_string(),
            message: err.to_string(),
        }
    } else if err.is_status() {
        ConnectionError::HttpStatus {
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            message: err.to_string(),
        }
    } else if err.is_body() || err.is_decode() {
        ConnectionError::Transport {
            message: err.to_string(),
        }
    } else {
        ConnectionError::Other {
            message: err.to_string(),
        }
    }
}
