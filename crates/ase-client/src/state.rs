//! Connection protocol state.
//!
//! ```text
//! Ready -> Streaming   (exec stopped on a row format or a non-zero return status)
//! Streaming -> Ready   (terminal done read by the cursor or the next command)
//! any -> Poisoned      (transport or protocol failure)
//! ```
//!
//! `Poisoned` is final.

/// Protocol state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolState {
    /// No reply is outstanding.
    #[default]
    Ready,
    /// Part of a reply is still unread behind an open cursor.
    Streaming,
    /// Connection is in a broken state due to a transport or protocol error.
    Poisoned,
}

impl ProtocolState {
    /// Check if the connection is in a usable state.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Poisoned)
    }

    /// Check if unread reply data is pending.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}
