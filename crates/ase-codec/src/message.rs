//! Logical message reassembly.
//!
//! A logical message spans one or more frames; the last frame carries the
//! `END_OF_MESSAGE` status flag.

use ase_protocol::packet::PacketType;
use bytes::{Bytes, BytesMut};

use crate::error::CodecError;
use crate::frame_codec::Frame;

/// Default upper bound for a reassembled message payload (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// A complete logical message reassembled from one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The message type, taken from the first frame.
    pub packet_type: PacketType,
    /// All frame bodies concatenated.
    pub payload: Bytes,
}

impl Message {
    /// Create a message.
    #[must_use]
    pub fn new(packet_type: PacketType, payload: Bytes) -> Self {
        Self {
            packet_type,
            payload,
        }
    }

    /// Get the message payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the message is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Reassembles frames into complete messages.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    packet_type: Option<PacketType>,
    frame_count: usize,
    max_message_size: usize,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self {
            buffer: BytesMut::new(),
            packet_type: None,
            frame_count: 0,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl MessageAssembler {
    /// Create a new message assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the size of a reassembled payload.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Largest accepted payload.
    #[must_use]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Push a frame into the assembler.
    ///
    /// Returns `Some(Message)` if this frame completes a message,
    /// `None` if more frames are needed. A payload growing past the maximum
    /// message size is an error and drops the partial message.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>, CodecError> {
        let size = self.buffer.len() + frame.body.len();
        if size > self.max_message_size {
            let max = self.max_message_size;
            self.clear();
            return Err(CodecError::MessageTooLarge { size, max });
        }

        let packet_type = *self.packet_type.get_or_insert(frame.header.packet_type);

        self.buffer.extend_from_slice(&frame.body);
        self.frame_count += 1;

        tracing::trace!(
            packet_type = ?packet_type,
            frame_count = self.frame_count,
            buffer_len = self.buffer.len(),
            is_eom = frame.is_end_of_message(),
            "assembling message"
        );

        if !frame.is_end_of_message() {
            return Ok(None);
        }

        self.packet_type = None;
        self.frame_count = 0;
        Ok(Some(Message::new(packet_type, self.buffer.split().freeze())))
    }

    /// Check if the assembler has partial data buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.packet_type.is_some()
    }

    /// Get the number of frames accumulated so far.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Clear any partial message data.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.packet_type = None;
        self.frame_count = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ase_protocol::packet::{PacketHeader, PacketStatus};

    fn make_frame(is_eom: bool, body: &'static [u8]) -> Frame {
        let status = if is_eom {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::NORMAL
        };
        let header = PacketHeader::new(PacketType::Response, status, 0);
        Frame::new(header, Bytes::from_static(body))
    }

    #[test]
    fn test_single_frame_message() {
        let mut assembler = MessageAssembler::new();

        let message = assembler
            .push(make_frame(true, b"hello"))
            .unwrap()
            .expect("should complete message");
        assert_eq!(message.packet_type, PacketType::Response);
        assert_eq!(&message.payload[..], b"hello");
        assert!(!assembler.has_partial());
    }

    #[test]
    fn test_multi_frame_message() {
        let mut assembler = MessageAssembler::new();

        assert!(assembler.push(make_frame(false, b"hello ")).unwrap().is_none());
        assert!(assembler.has_partial());
        assert!(assembler.push(make_frame(false, b"world")).unwrap().is_none());
        assert_eq!(assembler.frame_count(), 2);

        let message = assembler
            .push(make_frame(true, b"!"))
            .unwrap()
            .expect("should complete message");
        assert_eq!(&message.payload[..], b"hello world!");
        assert!(!assembler.has_partial());
        assert_eq!(assembler.frame_count(), 0);
    }

    #[test]
    fn test_header_only_frame_completes_empty_message() {
        let mut assembler = MessageAssembler::new();
        let message = assembler.push(make_frame(true, b"")).unwrap().unwrap();
        assert!(message.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut assembler = MessageAssembler::new();
        assembler.push(make_frame(false, b"partial")).unwrap();
        assert!(assembler.has_partial());

        assembler.clear();
        assert!(!assembler.has_partial());
        assert_eq!(assembler.frame_count(), 0);
    }

    #[test]
    fn test_message_over_limit_is_rejected() {
        let mut assembler = MessageAssembler::new().with_max_message_size(8);

        assert!(assembler.push(make_frame(false, b"12345")).unwrap().is_none());
        let err = assembler.push(make_frame(false, b"6789")).unwrap_err();
        assert!(matches!(err, CodecError::MessageTooLarge { size: 9, max: 8 }));
        assert!(!assembler.has_partial());

        // a message at the limit still completes
        let message = assembler.push(make_frame(true, b"12345678")).unwrap().unwrap();
        assert_eq!(message.len(), 8);
    }
}
