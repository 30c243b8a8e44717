//! Client error types.

use ase_codec::CodecError;
use ase_protocol::{Eed, ProtocolError};
use ase_types::TypeError;
use thiserror::Error;

/// Broad classification of an [`Error`].
///
/// The kind decides what happens to the connection: `Transport` and
/// `Protocol` errors poison it, `Application` and `Validation` errors leave
/// it usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// IO failure, cancellation, timeout or an unusable connection.
    Transport,
    /// The server sent something the client cannot accept.
    Protocol,
    /// The server reported a failure of the command itself.
    Application,
    /// Caller input was rejected before anything was sent.
    Validation,
}

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed package data.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Framing or transport failure.
    #[error("codec error: {0}")]
    Codec(CodecError),

    /// Argument conversion failed.
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    /// Well-formed packages arrived in a sequence the client does not accept.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A stored procedure returned a non-zero status.
    #[error("return status {0}")]
    ReturnStatus(i32),

    /// The server reported an error through an EED package.
    #[error("server error {number} (severity {severity}): {message}")]
    Server {
        /// Message number.
        number: i32,
        /// Severity class.
        severity: u8,
        /// Error state.
        state: u8,
        /// Message text.
        message: String,
        /// Server name, if reported.
        server: Option<String>,
        /// Stored procedure name, if applicable.
        procedure: Option<String>,
        /// Line number.
        line: u16,
    },

    /// Caller input was rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Command execution exceeded the configured timeout.
    #[error("command timed out")]
    CommandTimeout,

    /// An earlier transport or protocol failure left the connection unusable.
    #[error("connection is poisoned")]
    ConnectionPoisoned,
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Cancelled => Self::Cancelled,
            CodecError::Protocol(e) => Self::Protocol(e),
            other => Self::Codec(other),
        }
    }
}

impl From<&Eed> for Error {
    fn from(eed: &Eed) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self::Server {
            number: eed.number,
            severity: eed.severity,
            state: eed.state,
            message: eed.message.clone(),
            server: non_empty(&eed.server),
            procedure: non_empty(&eed.procedure),
            line: eed.line,
        }
    }
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Codec(e) if e.is_transport() => ErrorKind::Transport,
            Self::Codec(_) | Self::Protocol(_) | Self::ProtocolViolation(_) => ErrorKind::Protocol,
            Self::Cancelled | Self::CommandTimeout | Self::ConnectionPoisoned => {
                ErrorKind::Transport
            }
            Self::ReturnStatus(_) | Self::Server { .. } => ErrorKind::Application,
            Self::Type(_) | Self::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Check if this error came from a cancelled token.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is transient and may succeed on a new connection.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CommandTimeout | Self::Cancelled)
            || matches!(self, Self::Codec(e) if e.is_transport())
    }

    /// Check if this error indicates malformed or out-of-order server data.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }

    /// Check if this error leaves the connection unusable.
    #[must_use]
    pub fn poisons_connection(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Protocol)
    }

    /// Check if this is a server error with a specific number.
    #[must_use]
    pub fn is_server_error(&self, number: i32) -> bool {
        matches!(self, Self::Server { number: n, .. } if *n == number)
    }

    /// Get the severity if this is a server error.
    #[must_use]
    pub fn severity(&self) -> Option<u8> {
        match self {
            Self::Server { severity, .. } => Some(*severity),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
