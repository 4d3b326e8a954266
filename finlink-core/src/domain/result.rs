//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
///
/// Upstream variants carry the bank name plus whatever the bank answered so
/// callers can surface a gateway-class failure with diagnostics.
#[derive(Error, Debug)]
pub enum Error {
    /// Technical token exchange with the bank failed
    #[error("Bank '{bank}' rejected the token request{}: {body}", status_suffix(.status))]
    UpstreamAuth {
        bank: String,
        status: Option<u16>,
        body: String,
    },

    /// Any other bank HTTP call failed or timed out
    #[error("Request to bank '{bank}' failed{}: {body}", status_suffix(.status))]
    UpstreamRequest {
        bank: String,
        status: Option<u16>,
        body: String,
        timed_out: bool,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The connection exists but has no usable consent
    #[error("Consent required: {0}")]
    ConsentRequired(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an upstream error for a bank that answered with a non-success status
    pub fn upstream_status(bank: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamRequest {
            bank: bank.into(),
            status: Some(status),
            body: body.into(),
            timed_out: false,
        }
    }

    /// Create an upstream error for a failure without an HTTP status
    pub fn upstream_transport(
        bank: impl Into<String>,
        body: impl Into<String>,
        timed_out: bool,
    ) -> Self {
        Self::UpstreamRequest {
            bank: bank.into(),
            status: None,
            body: body.into(),
            timed_out,
        }
    }

    /// Whether this error came from a bank (maps to a gateway failure at the edge)
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamAuth { .. } | Self::UpstreamRequest { .. })
    }

    /// Whether repeating the same call may succeed
    ///
    /// Timeouts, transport failures, rate limiting and 5xx answers are
    /// retryable. Local state is never modified before an upstream call
    /// fails, so retrying the whole operation is safe.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamRequest { status: None, .. } => true,
            Self::UpstreamRequest {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
