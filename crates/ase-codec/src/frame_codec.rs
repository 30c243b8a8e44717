//! TDS 5.0 frame codec implementation.

use ase_protocol::packet::{MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PACKET_SIZE, PacketHeader};
use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// A wire frame: header and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header.
    pub header: PacketHeader,
    /// Frame body (excluding header).
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame with the given header and body.
    #[must_use]
    pub fn new(header: PacketHeader, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Get the total frame size including header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.body.len()
    }

    /// Check if this is the last frame in a message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

/// Frame codec for tokio-util framing.
///
/// Checks frame lengths against the packet size and fills in the header's
/// length field on encode. Sequence numbers are left to the channel.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_packet_size: usize,
}

impl FrameCodec {
    /// Create a new codec accepting frames up to 512 bytes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_packet_size: PACKET_SIZE,
        }
    }

    /// Create a new codec with a custom maximum frame size.
    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.set_max_packet_size(size);
        self
    }

    /// Change the maximum frame size.
    pub fn set_max_packet_size(&mut self, size: usize) {
        self.max_packet_size = size.clamp(PACKET_HEADER_SIZE, MAX_PACKET_SIZE);
    }

    /// Maximum frame size, header included.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        let length = u16::from_be_bytes([src[2], src[3]]) as usize;
        if !(PACKET_HEADER_SIZE..=self.max_packet_size).contains(&length) {
            return Err(CodecError::InvalidLength {
                length,
                max: self.max_packet_size,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(length);
        let header = PacketHeader::read_from(&mut frame);
        let body = frame.freeze();

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = length,
            channel = header.channel,
            packet_nr = header.packet_nr,
            is_eom = header.is_end_of_message(),
            "decoded frame"
        );

        Ok(Some(Frame::new(header, body)))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total_length = item.total_size();

        if total_length > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: total_length,
                max: self.max_packet_size,
            });
        }

        dst.reserve(total_length);

        let mut header = item.header;
        header.length = total_length as u16;
        header.write_to(dst);
        dst.put_slice(&item.body);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = total_length,
            channel = header.channel,
            packet_nr = header.packet_nr,
            "encoded frame"
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ase_protocol::packet::{PacketStatus, PacketType};

    fn raw_header(length: u16) -> BytesMut {
        let mut data = BytesMut::new();
        data.put_u8(PacketType::Response.as_u8());
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(length);
        data.put_u16(3); // channel
        data.put_u8(9); // packet nr
        data.put_u8(0); // window
        data
    }

    #[test]
    fn test_decode_frame() {
        let mut codec = FrameCodec::new();
        let mut data = raw_header(12);
        data.put_slice(b"test");

        let frame = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(frame.header.packet_type, PacketType::Response);
        assert_eq!(frame.header.channel, 3);
        assert_eq!(frame.header.packet_nr, 9);
        assert!(frame.is_end_of_message());
        assert_eq!(&frame.body[..], b"test");
        assert!(data.is_empty());
    }

    #[test]
    fn test_encode_sets_length_only() {
        let mut codec = FrameCodec::new();
        let header = PacketHeader::new(PacketType::Language, PacketStatus::END_OF_MESSAGE, 0)
            .with_channel(2)
            .with_packet_nr(41)
            .with_window(4);
        let frame = Frame::new(header, Bytes::from_static(b"test"));

        let mut dst = BytesMut::new();
        codec.encode(frame, &mut dst).unwrap();

        assert_eq!(dst.len(), 12);
        assert_eq!(&dst[..8], &[0x01, 0x01, 0, 12, 0, 2, 41, 4]);
    }

    #[test]
    fn test_incomplete_frame() {
        let mut codec = FrameCodec::new();
        let mut data = raw_header(12);
        data.put_slice(b"te");

        assert!(codec.decode(&mut data).unwrap().is_none());
    }

    #[test]
    fn test_length_below_header_rejected() {
        let mut codec = FrameCodec::new();
        let mut data = raw_header(7);
        assert!(matches!(
            codec.decode(&mut data),
            Err(CodecError::InvalidLength { length: 7, .. })
        ));
    }

    #[test]
    fn test_length_above_packet_size_rejected() {
        let mut codec = FrameCodec::new();
        let mut data = raw_header(513);
        assert!(matches!(
            codec.decode(&mut data),
            Err(CodecError::InvalidLength {
                length: 513,
                max: 512
            })
        ));
    }

    #[test]
    fn test_encode_too_large() {
        let mut codec = FrameCodec::new();
        let header = PacketHeader::new(PacketType::Language, PacketStatus::END_OF_MESSAGE, 0);
        let frame = Frame::new(header, Bytes::from(vec![0u8; 505]));

        let mut dst = BytesMut::new();
        assert!(matches!(
            codec.encode(frame, &mut dst),
            Err(CodecError::PacketTooLarge { size: 513, max: 512 })
        ));
    }
}
