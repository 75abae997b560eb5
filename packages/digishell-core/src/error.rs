//! Error types for the fldigi link.
//!
//! Connectivity failures (the remote is gone or unreachable) are kept apart
//! from application failures (the remote answered with a fault) because only
//! the former count toward the supervisor's failure threshold.

use std::fmt;
use thiserror::Error;

/// Coarse classification of a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    /// Nothing is listening on the configured port
    Refused,
    /// The remote did not answer within the call timeout
    Timeout,
    Other,
}

impl fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectErrorKind::Refused => "refused",
            ConnectErrorKind::Timeout => "timeout",
            ConnectErrorKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Failure to establish a connection, with an operator-readable message
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ConnectError {
    pub kind: ConnectErrorKind,
    pub message: String,
}

impl ConnectError {
    pub fn new(kind: ConnectErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build the message shown to the operator for a failed connect attempt
    pub fn for_endpoint(kind: ConnectErrorKind, host: &str, port: u16, detail: &str) -> Self {
        let message = match kind {
            ConnectErrorKind::Refused => format!(
                "Connection refused to {host}:{port}. Is FLDIGI running with XML-RPC enabled?"
            ),
            ConnectErrorKind::Timeout => format!(
                "Connection to {host}:{port} timed out. Check if FLDIGI is responding."
            ),
            ConnectErrorKind::Other => format!("Failed to connect to FLDIGI: {detail}"),
        };
        Self::new(kind, message)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LinkError {
    #[error("Not connected to FLDIGI")]
    NotConnected,

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("connection failure ({kind}): {message}")]
    Connectivity {
        kind: ConnectErrorKind,
        message: String,
    },

    #[error("FLDIGI fault {code}: {message}")]
    Application { code: i64, message: String },

    #[error("malformed XML-RPC payload: {0}")]
    Protocol(String),
}

impl LinkError {
    pub fn connectivity(kind: ConnectErrorKind, message: impl Into<String>) -> Self {
        LinkError::Connectivity {
            kind,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        LinkError::Protocol(message.into())
    }

    /// True when the failure says the remote is unreachable rather than that
    /// it rejected the request.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            LinkError::NotConnected | LinkError::Connect(_) | LinkError::Connectivity { .. }
        )
    }
}
