//! # Error Handling
//!
//! Error types for the registry mirror.
//!
//! ## Design Principles
//!
//! 1. **Contextual**: Errors carry the value or position that produced them
//! 2. **Recoverable**: Distinguish refresh-fatal errors (stream framing,
//!    I/O) from per-record errors that are absorbed into logs and counters

use thiserror::Error;

/// Result type alias for regsnap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for regsnap
#[derive(Error, Debug)]
pub enum Error {
    // Refresh-fatal errors
    #[error("IO error: {message}")]
    Io { message: String, source: std::io::Error },

    #[error("XML framing error: {message}")]
    Xml { message: String },

    // Per-record errors, absorbed by the refresh loop
    #[error("record decode error: {message}")]
    RecordDecode { message: String },

    #[error("malformed {kind} literal: {value}")]
    ValueParse { kind: &'static str, value: String },

    // System errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Check whether the refresh can continue past this error.
    ///
    /// Stream-level failures abort the refresh; record and value errors
    /// only skip the offending record or resource.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io { .. } => false,
            Error::Xml { .. } => false,
            Error::RecordDecode { .. } => true,
            Error::ValueParse { .. } => true,
            Error::Configuration { .. } => false,
            Error::Internal { .. } => false,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Io { .. } => "IO_ERROR",
            Error::Xml { .. } => "XML_ERROR",
            Error::RecordDecode { .. } => "RECORD_DECODE_ERROR",
            Error::ValueParse { .. } => "VALUE_PARSE_ERROR",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal {
            message: format!("payload encoding failed: {err}"),
        }
    }
}
