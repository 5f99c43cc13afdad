//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout sqlcommand.
//! Every error maps to a stable error code string for programmatic handling.
//!
//! # Error Categories
//! - `Driver`: native driver failure, enriched with command diagnostics
//! - `Translated`: a driver failure recognised as a known condition
//! - `NotFound`: `load_by_id` found no row for the identifier
//! - `RegistryExhausted` / `ExpectationMismatch` / `ResultShape`: scripted execution
//! - `MalformedEncodedText` / `NullArgument`: text obfuscation utility
//! - `InvalidCast` / `ColumnNotFound` / `OrdinalOutOfRange` / `NoCurrentRow`: field access
//! - `InvalidOperation`: misuse of a command, connection or transaction
//! - `Config`: configuration file or connection string errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expectation::Mismatch;

/// Marker recorded when a failing command had no connection attached
pub const NO_CONNECTION: &str = "Database connection does not exist";

/// Main error type for sqlcommand operations
#[derive(Error, Debug)]
pub enum DataError {
    /// Native driver failure with diagnostic context attached
    #[error("{0}")]
    Driver(Box<DriverFailure>),

    /// Driver failure re-surfaced as a more specific kind
    #[error("{kind}: {failure}")]
    Translated { kind: TranslatedKind, failure: Box<DriverFailure> },

    /// No row exists for the requested identifier
    #[error("No entity exists for ID {id} (procedure '{procedure}')")]
    NotFound { procedure: String, id: i32 },

    /// Scripted execution requested beyond the queued expectations
    #[error("This is call {call} and there are only {defined} expected results defined")]
    RegistryExhausted { call: usize, defined: usize },

    /// Strict expectation matching failed
    #[error("Command does not match expectation: {}", format_mismatches(.0))]
    ExpectationMismatch(Vec<Mismatch>),

    /// Scripted result cannot be returned by the requested execute operation
    #[error("Scripted result of kind {found} cannot satisfy {expected}")]
    ResultShape { expected: &'static str, found: &'static str },

    /// Obfuscated text was not in the expected format
    #[error("The obfuscated text was not in the correct format: {0}")]
    MalformedEncodedText(String),

    /// A required argument was absent
    #[error("Value cannot be null (parameter '{0}')")]
    NullArgument(&'static str),

    /// Cell value could not be read as the requested type
    #[error("Cannot read column {ordinal} as {expected}: found {found}")]
    InvalidCast { ordinal: usize, expected: &'static str, found: &'static str },

    /// No column with the given name
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    /// Ordinal beyond the number of columns
    #[error("Column ordinal {ordinal} out of range ({count} columns)")]
    OrdinalOutOfRange { ordinal: usize, count: usize },

    /// Cursor is not positioned on a row
    #[error("No current row; call advance() first")]
    NoCurrentRow,

    /// Invalid use of a command, connection or transaction
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration error (file not found, invalid JSON, missing connection string)
    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_mismatches(mismatches: &[Mismatch]) -> String {
    mismatches.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl DataError {
    /// Convert error to a stable error code string
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Driver(_) => "DRIVER_FAILURE",
            Self::Translated { .. } => "TRANSLATED_FAILURE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::RegistryExhausted { .. } => "REGISTRY_EXHAUSTED",
            Self::ExpectationMismatch(_) => "EXPECTATION_MISMATCH",
            Self::ResultShape { .. } => "RESULT_SHAPE",
            Self::MalformedEncodedText(_) => "MALFORMED_ENCODED_TEXT",
            Self::NullArgument(_) => "NULL_ARGUMENT",
            Self::InvalidCast { .. } => "INVALID_CAST",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::OrdinalOutOfRange { .. } => "ORDINAL_OUT_OF_RANGE",
            Self::NoCurrentRow => "NO_CURRENT_ROW",
            Self::InvalidOperation(_) => "INVALID_OPERATION",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Diagnostic context of a driver failure, translated or not
    #[must_use]
    pub fn driver_failure(&self) -> Option<&DriverFailure> {
        match self {
            Self::Driver(failure) | Self::Translated { failure, .. } => Some(&**failure),
            _ => None,
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a malformed encoded text error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEncodedText(message.into())
    }

    /// Wrap a driver error with the diagnostics of the command that raised it
    pub fn driver(error: DriverError, context: ErrorContext) -> Self {
        Self::Driver(Box::new(DriverFailure { error, context }))
    }
}

/// Error reported by the native driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverError {
    /// Extended result code, when the driver supplied one
    pub code: Option<i32>,
    /// Driver message
    pub message: String,
}

impl DriverError {
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Primary result code (low byte of the extended code)
    #[must_use]
    pub fn primary_code(&self) -> Option<i32> {
        self.code.map(|code| code & 0xff)
    }
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(error: rusqlite::Error) -> Self {
        let code = match &error {
            rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code),
            _ => None,
        };
        Self { code, message: error.to_string() }
    }
}

/// Diagnostics captured from the command that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Connection string (credentials redacted) or [`NO_CONNECTION`]
    pub connection: String,
    pub command_text: String,
    /// Command timeout in seconds
    pub command_timeout: u32,
    /// Formatted parameter dump
    pub parameters: String,
}

/// Driver failure plus the command diagnostics attached on the way out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverFailure {
    pub error: DriverError,
    pub context: ErrorContext,
}

impl std::fmt::Display for DriverFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Driver failure: {} [command: {}]", self.error, self.context.command_text)
    }
}

impl std::error::Error for DriverFailure {}

/// Known conditions a driver failure can be translated into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TranslatedKind {
    Timeout,
    Deadlock,
    Cancelled,
    Unknown,
}

impl std::fmt::Display for TranslatedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::util::NamedEnum;
        f.write_str(self.name())
    }
}

/// Result type alias for sqlcommand operations
pub type Result<T> = std::result::Result<T, DataError>;
