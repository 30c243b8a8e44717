//! Codec-level error types.

use ase_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while framing, sending or receiving messages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// IO error on the underlying transport, including short reads.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the transport before a message was complete.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame header announced a length outside the accepted range.
    #[error("invalid frame length {length}, expected 8..={max}")]
    InvalidLength {
        /// Announced length.
        length: usize,
        /// Largest accepted length.
        max: usize,
    },

    /// An outgoing frame does not fit the negotiated packet size.
    #[error("frame of {size} bytes exceeds packet size {max}")]
    PacketTooLarge {
        /// Frame size including header.
        size: usize,
        /// Packet size.
        max: usize,
    },

    /// A reassembled message grew past the configured maximum.
    #[error("message of {size} bytes exceeds maximum message size {max}")]
    MessageTooLarge {
        /// Payload size including the offending frame.
        size: usize,
        /// Maximum message size.
        max: usize,
    },

    /// A frame arrived for a different channel.
    #[error("frame for channel {actual} received on channel {expected}")]
    ChannelMismatch {
        /// This channel's id.
        expected: u16,
        /// Channel id in the frame header.
        actual: u16,
    },

    /// The channel failed earlier and must not be used again.
    #[error("channel is no longer usable")]
    ChannelInvalid,

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Header encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl CodecError {
    /// Check if this error was caused by the transport rather than by
    /// malformed data.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ConnectionClosed | Self::ChannelInvalid | Self::Cancelled
        )
    }
}
