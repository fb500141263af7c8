//! Error types for conversion and migration operations

use thiserror::Error;

/// Errors that can occur while converting a structured document to Markdown
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Input is not a structured document
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Conversion timeout exceeded
    #[error("Conversion timeout exceeded")]
    Timeout,
    /// Invalid input data (e.g. nesting too deep)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ConversionError {
    /// Get numeric error code
    pub fn code(&self) -> u32 {
        match self {
            ConversionError::ParseError(_) => 1,
            ConversionError::Timeout => 3,
            ConversionError::InvalidInput(_) => 5,
        }
    }
}

/// Errors that abort a migration run or a single source read
///
/// Per-item problems (missing test detail, failed attachment download, a
/// destination write answered with a non-retryable status) are not errors at
/// this level: they are recorded as diagnostics and the run continues.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Missing or invalid configuration, raised before any network activity
    #[error("Configuration error: {0}")]
    Config(String),
    /// A source read returned a non-success status
    #[error("Request to {url} failed with status {status}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },
    /// Network failure (connection refused, timeout, TLS)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Destination kept answering 429 after every retry
    #[error("Rate limit still in effect after {attempts} attempts: {url}")]
    RateLimited { attempts: u32, url: String },
    /// Destination write failed after exhausting retries on a transient error
    #[error("Write to {url} failed: {reason}")]
    WriteFailed { url: String, reason: String },
    /// Response payload did not have the expected shape
    #[error("Unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
    /// Attachment file handling failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Requested entity does not exist in the source
    #[error("Not found: {0}")]
    NotFound(String),
    /// Document conversion failed
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl MigrationError {
    /// Process exit status for a run aborted by this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrationError::Config(_) => 2,
            MigrationError::Http { .. } => 3,
            MigrationError::Transport(_) => 4,
            MigrationError::RateLimited { .. } => 5,
            MigrationError::WriteFailed { .. } => 6,
            MigrationError::Decode { .. } => 7,
            MigrationError::Io(_) => 8,
            MigrationError::NotFound(_) => 9,
            MigrationError::Conversion(_) => 10,
        }
    }

    pub(crate) fn decode(url: impl Into<String>, reason: impl ToString) -> Self {
        MigrationError::Decode {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
