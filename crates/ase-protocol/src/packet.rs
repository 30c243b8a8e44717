//! TDS packet header definitions.

use std::fmt;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Total size of a wire frame in bytes (header included).
pub const PACKET_SIZE: usize = 512;

/// TDS packet header size in bytes.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Maximum body size of a default-sized frame.
pub const PACKET_BODY_SIZE: usize = PACKET_SIZE - PACKET_HEADER_SIZE;

/// Largest frame length the 16-bit length field can describe.
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// Message class carried in byte 0 of every header.
///
/// Values unknown to this crate decode to [`PacketType::Unknown`] so that
/// header decoding never rejects a frame on its type alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Language command.
    Language,
    /// Login request.
    Login,
    /// Remote procedure call.
    Rpc,
    /// Server response.
    Response,
    /// Unformatted data.
    Unformatted,
    /// Attention (cancel) request.
    Attention,
    /// Bulk data.
    Bulk,
    /// Protocol setup.
    Setup,
    /// Close connection.
    Close,
    /// Error.
    Error,
    /// Protocol acknowledgment.
    ProtocolAck,
    /// Echo.
    Echo,
    /// Logout.
    Logout,
    /// End of parameters.
    EndParam,
    /// Normal package stream (dynamic statements, cursors).
    Normal,
    /// Urgent event.
    Urgent,
    /// Connection migration.
    Migrate,
    /// Hello.
    Hello,
    /// Command sequence, normal.
    CmdSeqNormal,
    /// Command sequence, login.
    CmdSeqLogin,
    /// Command sequence, liveness.
    CmdSeqLiveness,
    /// Command sequence, reserved.
    CmdSeqReserved1,
    /// Command sequence, reserved.
    CmdSeqReserved2,
    /// Any other byte value.
    Unknown(u8),
}

impl PacketType {
    /// Create a packet type from a raw byte value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::Language,
            0x02 => Self::Login,
            0x03 => Self::Rpc,
            0x04 => Self::Response,
            0x05 => Self::Unformatted,
            0x06 => Self::Attention,
            0x07 => Self::Bulk,
            0x08 => Self::Setup,
            0x09 => Self::Close,
            0x0A => Self::Error,
            0x0B => Self::ProtocolAck,
            0x0C => Self::Echo,
            0x0D => Self::Logout,
            0x0E => Self::EndParam,
            0x0F => Self::Normal,
            0x10 => Self::Urgent,
            0x11 => Self::Migrate,
            0x12 => Self::Hello,
            0x13 => Self::CmdSeqNormal,
            0x14 => Self::CmdSeqLogin,
            0x15 => Self::CmdSeqLiveness,
            0x16 => Self::CmdSeqReserved1,
            0x17 => Self::CmdSeqReserved2,
            other => Self::Unknown(other),
        }
    }

    /// Raw byte value of this packet type.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Language => 0x01,
            Self::Login => 0x02,
            Self::Rpc => 0x03,
            Self::Response => 0x04,
            Self::Unformatted => 0x05,
            Self::Attention => 0x06,
            Self::Bulk => 0x07,
            Self::Setup => 0x08,
            Self::Close => 0x09,
            Self::Error => 0x0A,
            Self::ProtocolAck => 0x0B,
            Self::Echo => 0x0C,
            Self::Logout => 0x0D,
            Self::EndParam => 0x0E,
            Self::Normal => 0x0F,
            Self::Urgent => 0x10,
            Self::Migrate => 0x11,
            Self::Hello => 0x12,
            Self::CmdSeqNormal => 0x13,
            Self::CmdSeqLogin => 0x14,
            Self::CmdSeqLiveness => 0x15,
            Self::CmdSeqReserved1 => 0x16,
            Self::CmdSeqReserved2 => 0x17,
            Self::Unknown(other) => other,
        }
    }
}

bitflags! {
    /// TDS packet status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketStatus: u8 {
        /// Last frame of a logical message.
        const END_OF_MESSAGE = 0x01;
        /// Acknowledgment of the last attention.
        const ATTENTION_ACK = 0x02;
        /// Attention request.
        const ATTENTION = 0x04;
        /// Event notification.
        const EVENT = 0x08;
        /// Frame is encrypted.
        const SEAL = 0x10;
        /// Frame is encrypted (command sequence protocol).
        const ENCRYPT = 0x20;
        /// Frame is encrypted with a symmetric key.
        const SYMMETRIC_ENCRYPT = 0x40;
    }
}

impl PacketStatus {
    /// Status without any flag set.
    pub const NORMAL: Self = Self::empty();
}

/// TDS packet header.
///
/// Every frame begins with an 8-byte header. Multi-byte fields are
/// big-endian regardless of the byte order negotiated for package bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Type of message this frame belongs to.
    pub packet_type: PacketType,
    /// Status flags.
    pub status: PacketStatus,
    /// Total frame length including header.
    pub length: u16,
    /// Channel the frame belongs to when multiplexing.
    pub channel: u16,
    /// Per-channel sequence number (wraps at 255).
    pub packet_nr: u8,
    /// Flow-control window credit.
    pub window: u8,
}

impl PacketHeader {
    /// Create a new packet header on channel 0.
    #[must_use]
    pub const fn new(packet_type: PacketType, status: PacketStatus, length: u16) -> Self {
        Self {
            packet_type,
            status,
            length,
            channel: 0,
            packet_nr: 0,
            window: 0,
        }
    }

    /// Encode the header into a buffer of exactly [`PACKET_HEADER_SIZE`] bytes.
    pub fn encode(&self, dst: &mut [u8]) -> Result<(), ProtocolError> {
        if dst.len() != PACKET_HEADER_SIZE {
            return Err(ProtocolError::BufferLength {
                expected: PACKET_HEADER_SIZE,
                actual: dst.len(),
            });
        }

        let mut cursor = dst;
        self.write_to(&mut cursor);
        Ok(())
    }

    /// Decode a header from a buffer of exactly [`PACKET_HEADER_SIZE`] bytes.
    ///
    /// No field validation happens here; range and consistency checks belong
    /// to the framing layer.
    pub fn decode(src: &[u8]) -> Result<Self, ProtocolError> {
        if src.len() != PACKET_HEADER_SIZE {
            return Err(ProtocolError::BufferLength {
                expected: PACKET_HEADER_SIZE,
                actual: src.len(),
            });
        }

        let mut cursor = src;
        Ok(Self::read_from(&mut cursor))
    }

    /// Write the header to a growable buffer.
    pub fn write_to(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.packet_type.as_u8());
        dst.put_u8(self.status.bits());
        dst.put_u16(self.length);
        dst.put_u16(self.channel);
        dst.put_u8(self.packet_nr);
        dst.put_u8(self.window);
    }

    /// Read a header from a buffer holding at least [`PACKET_HEADER_SIZE`] bytes.
    ///
    /// Callers are responsible for the length check; see [`PacketHeader::decode`].
    pub fn read_from(src: &mut impl Buf) -> Self {
        let packet_type = PacketType::from_u8(src.get_u8());
        let status = PacketStatus::from_bits_retain(src.get_u8());
        let length = src.get_u16();
        let channel = src.get_u16();
        let packet_nr = src.get_u8();
        let window = src.get_u8();

        Self {
            packet_type,
            status,
            length,
            channel,
            packet_nr,
            window,
        }
    }

    /// Encode the packet header to a new `Bytes` buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE);
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Get the body length (total length minus header).
    #[must_use]
    pub const fn body_length(&self) -> usize {
        self.length.saturating_sub(PACKET_HEADER_SIZE as u16) as usize
    }

    /// Check if this is the last frame in a message.
    #[must_use]
    pub const fn is_end_of_message(&self) -> bool {
        self.status.contains(PacketStatus::END_OF_MESSAGE)
    }

    /// Set the channel id.
    #[must_use]
    pub const fn with_channel(mut self, channel: u16) -> Self {
        self.channel = channel;
        self
    }

    /// Set the sequence number.
    #[must_use]
    pub const fn with_packet_nr(mut self, packet_nr: u8) -> Self {
        self.packet_nr = packet_nr;
        self
    }

    /// Set the window credit.
    #[must_use]
    pub const fn with_window(mut self, window: u8) -> Self {
        self.window = window;
        self
    }
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self::new(
            PacketType::Language,
            PacketStatus::END_OF_MESSAGE,
            PACKET_SIZE as u16,
        )
    }
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type: {:?}, status: {:?}, length: {}, channel: {}, packet_nr: {}, window: {}",
            self.packet_type, self.status, self.length, self.channel, self.packet_nr, self.window
        )
    }
}
