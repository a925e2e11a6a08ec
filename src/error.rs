//! Error types for wbem-dump
//!
//! This module defines the error hierarchy that covers:
//! - WBEM operation errors, each tagged with an [`ErrorKind`]
//! - Configuration and CLI errors
//! - Local filesystem errors
//!
//! Remote errors are classified structurally through [`ErrorKind`] so the
//! exporter can decide with a `match` whether a failure is silent, logged,
//! or fatal.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the wbem-dump application
#[derive(Error, Debug)]
pub enum DumpError {
    /// WBEM operation errors that were escalated (discovery, transport)
    #[error("WBEM error: {0}")]
    Wbem(#[from] WbemError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to create a directory or write a file in the output tree
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Classification of a failed WBEM operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The service does not implement the operation here (CIM_ERR_NOT_SUPPORTED)
    NotSupported,
    /// The operation succeeded but carried no return value
    EmptyResult,
    /// Any other remote or per-call failure, including timeouts
    Other,
    /// The service cannot be reached or refused our credentials
    Transport,
    /// Local I/O failure while talking to the service (debug capture etc.)
    Io,
}

impl ErrorKind {
    /// Short name used in log output
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::EmptyResult => "empty-result",
            ErrorKind::Other => "other",
            ErrorKind::Transport => "transport",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed WBEM operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed ({kind}): {message}")]
pub struct WbemError {
    /// Error classification
    pub kind: ErrorKind,

    /// Intrinsic method name (EnumerateClassNames, GetInstance, ...)
    pub operation: String,

    /// Human-readable description
    pub message: String,

    /// CIM status code, when the service returned one
    pub code: Option<u32>,
}

impl WbemError {
    pub fn new(kind: ErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
            code: None,
        }
    }

    /// Build an error from a CIM `ERROR` element
    pub fn from_cim_status(operation: impl Into<String>, code: u32, description: &str) -> Self {
        let kind = match code {
            CIM_ERR_NOT_SUPPORTED => ErrorKind::NotSupported,
            _ => ErrorKind::Other,
        };
        let message = if description.is_empty() {
            format!("CIM error {}", code)
        } else {
            format!("CIM error {}: {}", code, description)
        };
        Self {
            kind,
            operation: operation.into(),
            message,
            code: Some(code),
        }
    }

    pub fn not_supported(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, operation, message)
    }

    pub fn empty_result(operation: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmptyResult, operation, "response carried no return value")
    }

    pub fn other(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, operation, message)
    }

    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, operation, message)
    }

    /// NotSupported and EmptyResult mean "nothing to export here"
    pub fn is_silent(&self) -> bool {
        matches!(self.kind, ErrorKind::NotSupported | ErrorKind::EmptyResult)
    }

    /// Transport and Io failures abort the whole dump
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport | ErrorKind::Io)
    }
}

/// CIM_ERR_NOT_SUPPORTED status code (DSP0200)
pub const CIM_ERR_NOT_SUPPORTED: u32 = 7;

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// --class given without --namespace
    #[error("Class '{class}' requires a namespace (use --namespace)")]
    ClassWithoutNamespace { class: String },

    /// Class name is not a CIM identifier
    #[error("Invalid class name '{class}': must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidClassName { class: String },

    /// Unknown URL scheme
    #[error("Invalid scheme '{scheme}': expected http or https")]
    InvalidScheme { scheme: String },

    /// Host empty or unparseable endpoint
    #[error("Invalid service endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Zero timeout
    #[error("Invalid timeout for {what}: must be at least 1 second")]
    InvalidTimeout { what: &'static str },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Result type alias for DumpError
pub type Result<T> = std::result::Result<T, DumpError>;

/// Result type alias for WbemError
pub type WbemResult<T> = std::result::Result<T, WbemError>;
