//! Error types for the OneDrive client
//!
//! This module defines the error taxonomy shared by the token manager,
//! the transport and the chunked transfer engine.

use std::fmt;
use std::time::Duration;

/// Comprehensive error type for drive operations
#[derive(Debug, Clone)]
pub enum DriveError {
    /// Token missing, revoked or not renewable. Fatal for the command.
    AuthError {
        message: String,
        source: Option<String>,
    },

    /// Remote path does not exist
    NotFoundError {
        message: String,
        path: Option<String>,
    },

    /// Timeout, connection reset, 5xx or rate limiting
    TransientNetworkError {
        message: String,
        status: Option<u16>,
        retry_after: Option<Duration>,
        source: Option<String>,
    },

    /// A transfer gave up after exhausting its retries
    TransferError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Local file could not be read or written
    LocalIOError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Rejected input, e.g. uploading a directory
    ValidationError {
        message: String,
        field: Option<String>,
    },

    /// Non-transient HTTP failure reported by the API
    ApiError {
        message: String,
        status: u16,
        body: Option<String>,
    },

    /// Malformed JSON from the API or on disk
    ParseError {
        message: String,
        source: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },
}

impl DriveError {
    /// Create a new AuthError
    pub fn auth_error(message: impl Into<String>) -> Self {
        DriveError::AuthError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new AuthError with source
    pub fn auth_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        DriveError::AuthError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new NotFoundError for a remote path
    pub fn not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        DriveError::NotFoundError {
            message: "path not found".to_string(),
            path: Some(path),
        }
    }

    /// Create a new TransientNetworkError
    pub fn transient(message: impl Into<String>) -> Self {
        DriveError::TransientNetworkError {
            message: message.into(),
            status: None,
            retry_after: None,
            source: None,
        }
    }

    /// Create a new TransientNetworkError carrying the HTTP status
    pub fn transient_status(status: u16, retry_after: Option<Duration>, source: impl Into<String>) -> Self {
        DriveError::TransientNetworkError {
            message: format!("server responded with HTTP {}", status),
            status: Some(status),
            retry_after,
            source: Some(source.into()),
        }
    }

    /// Create a new TransferError
    pub fn transfer_error(message: impl Into<String>) -> Self {
        DriveError::TransferError {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new TransferError with path and source
    pub fn transfer_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        DriveError::TransferError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new LocalIOError with path and source
    pub fn local_io_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        DriveError::LocalIOError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ValidationError with field
    pub fn validation_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        DriveError::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new ApiError
    pub fn api_error(message: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        DriveError::ApiError {
            message: message.into(),
            status,
            body: if body.is_empty() { None } else { Some(body) },
        }
    }

    /// Create a new ParseError with source
    pub fn parse_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        DriveError::ParseError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        DriveError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        DriveError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Classify a non-success HTTP status returned by the API.
    ///
    /// 408, 429 and 5xx are transient; 401 is an auth failure; 404 maps to
    /// NotFoundError; every other status is a terminal ApiError.
    pub fn from_status(status: u16, body: impl Into<String>, retry_after: Option<Duration>, path: &str) -> Self {
        let body = body.into();
        match status {
            404 => DriveError::not_found(path),
            401 => DriveError::auth_error_with_source("access token rejected by the API", body),
            408 | 429 | 500..=599 => DriveError::transient_status(status, retry_after, body),
            _ => DriveError::api_error(format!("request for {} failed", path), status, body),
        }
    }

    /// Whether the failed operation may succeed if repeated unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriveError::TransientNetworkError { .. })
    }

    /// Server-requested delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DriveError::TransientNetworkError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            DriveError::AuthError { source, .. }
            | DriveError::TransientNetworkError { source, .. }
            | DriveError::TransferError { source, .. }
            | DriveError::LocalIOError { source, .. }
            | DriveError::ParseError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            _ => {}
        }
        self
    }
}

impl fmt::Display for DriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveError::AuthError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Auth error: {} (source: {})", message, src)
                } else {
                    write!(f, "Auth error: {}", message)
                }
            }
            DriveError::NotFoundError { message, path } => {
                if let Some(p) = path {
                    write!(f, "Not found: {} (path: {})", message, p)
                } else {
                    write!(f, "Not found: {}", message)
                }
            }
            DriveError::TransientNetworkError { message, source, .. } => {
                if let Some(src) = source {
                    write!(f, "Network error (retryable): {} (source: {})", message, src)
                } else {
                    write!(f, "Network error (retryable): {}", message)
                }
            }
            DriveError::TransferError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Transfer error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Transfer error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Transfer error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Transfer error: {}", message),
                }
            }
            DriveError::LocalIOError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Local I/O error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Local I/O error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Local I/O error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Local I/O error: {}", message),
                }
            }
            DriveError::ValidationError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Validation error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Validation error: {}", message)
                }
            }
            DriveError::ApiError { message, status, body } => {
                if let Some(b) = body {
                    write!(f, "API error: {} [HTTP {}] ({})", message, status, b)
                } else {
                    write!(f, "API error: {} [HTTP {}]", message, status)
                }
            }
            DriveError::ParseError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Parse error: {} (source: {})", message, src)
                } else {
                    write!(f, "Parse error: {}", message)
                }
            }
            DriveError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for DriveError {}

impl From<std::io::Error> for DriveError {
    fn from(err: std::io::Error) -> Self {
        DriveError::LocalIOError {
            message: err.to_string(),
            path: None,
            source: Some(err.kind().to_string()),
        }
    }
}

impl From<serde_json::Error> for DriveError {
    fn from(err: serde_json::Error) -> Self {
        DriveError::parse_error_with_source("Failed to parse JSON data", err.to_string())
    }
}

impl From<url::ParseError> for DriveError {
    fn from(err: url::ParseError) -> Self {
        DriveError::validation_error_with_field(format!("invalid URL: {}", err), "url")
    }
}

impl From<reqwest::Error> for DriveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            DriveError::TransientNetworkError {
                message: "request did not complete".to_string(),
                status: err.status().map(|s| s.as_u16()),
                retry_after: None,
                source: Some(err.to_string()),
            }
        } else if err.is_decode() {
            DriveError::parse_error_with_source("Failed to decode response body", err.to_string())
        } else {
            DriveError::TransferError {
                message: "HTTP client failure".to_string(),
                path: None,
                source: Some(err.to_string()),
            }
        }
    }
}
