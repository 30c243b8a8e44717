//! Logical channels over a split transport.
//!
//! A channel segments outgoing messages into frames and reassembles incoming
//! frames into messages. It owns its sequence number and window credit; no
//! state is shared with other channels.

use ase_protocol::packet::{
    MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PACKET_SIZE, PacketHeader, PacketStatus, PacketType,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

use crate::error::CodecError;
use crate::frame_codec::{Frame, FrameCodec};
use crate::framed::{FrameReader, FrameWriter};
use crate::message::{DEFAULT_MAX_MESSAGE_SIZE, Message, MessageAssembler};

/// Smallest usable packet size: a header and one body byte.
pub const MIN_PACKET_SIZE: usize = PACKET_HEADER_SIZE + 1;

/// Channel settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Channel id written to every frame.
    pub id: u16,
    /// Window credit written to every frame.
    pub window: u8,
    /// Frame size, header included.
    pub packet_size: usize,
    /// Largest reassembled message payload accepted from the peer.
    pub max_message_size: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            id: 0,
            window: 0,
            packet_size: PACKET_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ChannelOptions {
    /// Set the channel id.
    #[must_use]
    pub fn id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// Set the window credit.
    #[must_use]
    pub fn window(mut self, window: u8) -> Self {
        self.window = window;
        self
    }

    /// Set the packet size.
    #[must_use]
    pub fn packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Set the largest accepted incoming message.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

/// A logical channel.
///
/// Sends and receives are sequential (`&mut self`); serializing commands on
/// one channel is the caller's job. After any error or cancellation the
/// channel is invalid and every further call fails with
/// [`CodecError::ChannelInvalid`].
pub struct Channel<T>
where
    T: AsyncRead + AsyncWrite,
{
    reader: FrameReader<ReadHalf<T>>,
    writer: FrameWriter<WriteHalf<T>>,
    assembler: MessageAssembler,
    id: u16,
    packet_nr: u8,
    window: u8,
    packet_size: usize,
    valid: bool,
}

impl<T> Channel<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a channel over `transport`.
    ///
    /// The transport is immediately split into read and write halves.
    pub fn new(transport: T, options: ChannelOptions) -> Self {
        let packet_size = options.packet_size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
        let codec = FrameCodec::new().with_max_packet_size(packet_size);
        let (read_half, write_half) = tokio::io::split(transport);

        Self {
            reader: FrameReader::with_codec(read_half, codec.clone()),
            writer: FrameWriter::with_codec(write_half, codec),
            assembler: MessageAssembler::new().with_max_message_size(options.max_message_size),
            id: options.id,
            packet_nr: 0,
            window: options.window,
            packet_size,
            valid: true,
        }
    }

    /// Channel id.
    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Sequence number the next frame will carry.
    #[must_use]
    pub fn packet_nr(&self) -> u8 {
        self.packet_nr
    }

    /// Window credit written to outgoing frames.
    #[must_use]
    pub fn window(&self) -> u8 {
        self.window
    }

    /// Change the window credit for subsequent frames.
    pub fn set_window(&mut self, window: u8) {
        self.window = window;
    }

    /// Frame size, header included.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Change the frame size for both directions.
    pub fn set_packet_size(&mut self, packet_size: usize) {
        self.packet_size = packet_size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
        self.reader.codec_mut().set_max_packet_size(self.packet_size);
        self.writer.codec_mut().set_max_packet_size(self.packet_size);
    }

    /// Check if the channel can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Mark the channel as unusable.
    pub fn invalidate(&mut self) {
        if self.valid {
            tracing::debug!(channel = self.id, "channel invalidated");
        }
        self.valid = false;
        self.assembler.clear();
    }

    fn ensure_valid(&self) -> Result<(), CodecError> {
        if self.valid {
            Ok(())
        } else {
            Err(CodecError::ChannelInvalid)
        }
    }

    fn next_packet_nr(&mut self) -> u8 {
        let nr = self.packet_nr;
        self.packet_nr = self.packet_nr.wrapping_add(1);
        nr
    }

    /// Split a payload into frames, consuming sequence numbers.
    fn frames(&mut self, packet_type: PacketType, payload: &Bytes) -> Vec<Frame> {
        let max_body = self.packet_size - PACKET_HEADER_SIZE;
        let count = payload.len().div_ceil(max_body).max(1);
        let mut frames = Vec::with_capacity(count);

        for i in 0..count {
            let start = i * max_body;
            let end = (start + max_body).min(payload.len());
            let status = if i + 1 == count {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::NORMAL
            };
            let header = PacketHeader::new(packet_type, status, 0)
                .with_channel(self.id)
                .with_packet_nr(self.next_packet_nr())
                .with_window(self.window);
            frames.push(Frame::new(header, payload.slice(start..end)));
        }

        frames
    }
}

impl<T> Channel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Send a logical message.
    ///
    /// The payload is split into frames of at most `packet_size - 8` body
    /// bytes; only the last frame carries `END_OF_MESSAGE`. An empty payload
    /// is sent as one header-only frame.
    pub async fn send_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), CodecError> {
        self.ensure_valid()?;

        let frames = self.frames(packet_type, &payload);
        tracing::trace!(
            channel = self.id,
            packet_type = ?packet_type,
            len = payload.len(),
            frames = frames.len(),
            "sending message"
        );

        let writer = &mut self.writer;
        let send = async move {
            for frame in frames {
                writer.feed(frame).await?;
            }
            writer.flush().await
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CodecError::Cancelled),
            result = send => result,
        };

        if result.is_err() {
            self.invalidate();
        }
        result
    }

    /// Read the next logical message.
    ///
    /// Blocks until a frame with `END_OF_MESSAGE` arrives on this channel.
    pub async fn read_message(&mut self, cancel: &CancellationToken) -> Result<Message, CodecError> {
        self.ensure_valid()?;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                frame = self.reader.next() => Some(frame),
            };

            let frame = match next {
                None => {
                    self.invalidate();
                    return Err(CodecError::Cancelled);
                }
                Some(None) => {
                    self.invalidate();
                    return Err(CodecError::ConnectionClosed);
                }
                Some(Some(Err(e))) => {
                    self.invalidate();
                    return Err(e);
                }
                Some(Some(Ok(frame))) => frame,
            };

            if frame.header.channel != self.id {
                let actual = frame.header.channel;
                self.invalidate();
                return Err(CodecError::ChannelMismatch {
                    expected: self.id,
                    actual,
                });
            }

            let assembled = match self.assembler.push(frame) {
                Ok(assembled) => assembled,
                Err(e) => {
                    self.invalidate();
                    return Err(e);
                }
            };
            if let Some(message) = assembled {
                tracing::trace!(
                    channel = self.id,
                    packet_type = ?message.packet_type,
                    len = message.len(),
                    "received message"
                );
                return Ok(message);
            }
        }
    }
}

impl<T> std::fmt::Debug for Channel<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("packet_nr", &self.packet_nr)
            .field("window", &self.window)
            .field("packet_size", &self.packet_size)
            .field("max_message_size", &self.assembler.max_message_size())
            .field("valid", &self.valid)
            .field("has_partial_message", &self.assembler.has_partial())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    async fn read_frame(peer: &mut DuplexStream) -> (PacketHeader, Vec<u8>) {
        let mut raw = [0u8; PACKET_HEADER_SIZE];
        peer.read_exact(&mut raw).await.unwrap();
        let header = PacketHeader::decode(&raw).unwrap();
        let mut body = vec![0u8; header.body_length()];
        peer.read_exact(&mut body).await.unwrap();
        (header, body)
    }

    fn raw_frame(status: PacketStatus, channel: u16, body: &[u8]) -> Vec<u8> {
        let header = PacketHeader::new(
            PacketType::Response,
            status,
            (PACKET_HEADER_SIZE + body.len()) as u16,
        )
        .with_channel(channel);
        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    #[tokio::test]
    async fn test_multi_frame_send() {
        let (client, mut peer) = tokio::io::duplex(8192);
        let mut channel = Channel::new(client, ChannelOptions::default().id(3).window(2));
        let cancel = CancellationToken::new();

        let payload = Bytes::from((0..1100u32).map(|i| i as u8).collect::<Vec<_>>());
        channel
            .send_message(PacketType::Language, payload.clone(), &cancel)
            .await
            .unwrap();

        let mut received = Vec::new();
        for (i, expected_len) in [512u16, 512, 8 + 92].into_iter().enumerate() {
            let (header, body) = read_frame(&mut peer).await;
            assert_eq!(header.packet_type, PacketType::Language);
            assert_eq!(header.length, expected_len);
            assert_eq!(header.length as usize, PACKET_HEADER_SIZE + body.len());
            assert_eq!(header.channel, 3);
            assert_eq!(header.window, 2);
            assert_eq!(header.packet_nr, i as u8);
            assert_eq!(header.is_end_of_message(), i == 2);
            received.extend_from_slice(&body);
        }
        assert_eq!(received, payload);
        assert_eq!(channel.packet_nr(), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_frame() {
        let (client, mut peer) = tokio::io::duplex(8192);
        let mut channel = Channel::new(client, ChannelOptions::default());
        let cancel = CancellationToken::new();

        channel
            .send_message(PacketType::Normal, Bytes::from(vec![7u8; 504]), &cancel)
            .await
            .unwrap();

        let (header, body) = read_frame(&mut peer).await;
        assert!(header.is_end_of_message());
        assert_eq!(body.len(), 504);
        assert_eq!(channel.packet_nr(), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_sends_header_only_frame() {
        let (client, mut peer) = tokio::io::duplex(1024);
        let mut channel = Channel::new(client, ChannelOptions::default());
        let cancel = CancellationToken::new();

        channel
            .send_message(PacketType::Attention, Bytes::new(), &cancel)
            .await
            .unwrap();

        let (header, body) = read_frame(&mut peer).await;
        assert_eq!(header.length, 8);
        assert!(header.is_end_of_message());
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_packet_nr_wraps() {
        let (client, mut peer) = tokio::io::duplex(1 << 20);
        let mut channel = Channel::new(client, ChannelOptions::default());
        let cancel = CancellationToken::new();

        // 257 frames: numbers 0..=255 then 0 again
        let payload = Bytes::from(vec![1u8; 504 * 257]);
        channel
            .send_message(PacketType::Language, payload, &cancel)
            .await
            .unwrap();

        let mut last = None;
        for _ in 0..257 {
            last = Some(read_frame(&mut peer).await.0);
        }
        let last = last.unwrap();
        assert_eq!(last.packet_nr, 0);
        assert!(last.is_end_of_message());
        assert_eq!(channel.packet_nr(), 1);
    }

    #[tokio::test]
    async fn test_channels_keep_independent_sequences() {
        let (a, mut peer_a) = tokio::io::duplex(4096);
        let (b, mut peer_b) = tokio::io::duplex(4096);
        let mut first = Channel::new(a, ChannelOptions::default().id(1));
        let mut second = Channel::new(b, ChannelOptions::default().id(2));
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            first
                .send_message(PacketType::Language, Bytes::from_static(b"x"), &cancel)
                .await
                .unwrap();
        }
        second
            .send_message(PacketType::Language, Bytes::from_static(b"y"), &cancel)
            .await
            .unwrap();

        for expected in 0..3u8 {
            let (header, _) = read_frame(&mut peer_a).await;
            assert_eq!((header.channel, header.packet_nr), (1, expected));
        }
        let (header, _) = read_frame(&mut peer_b).await;
        assert_eq!((header.channel, header.packet_nr), (2, 0));
    }

    #[tokio::test]
    async fn test_read_reassembles_frames() {
        let (client, mut peer) = tokio::io::duplex(4096);
        let mut channel = Channel::new(client, ChannelOptions::default());
        let cancel = CancellationToken::new();

        peer.write_all(&raw_frame(PacketStatus::NORMAL, 0, b"abc"))
            .await
            .unwrap();
        peer.write_all(&raw_frame(PacketStatus::END_OF_MESSAGE, 0, b"def"))
            .await
            .unwrap();

        let message = channel.read_message(&cancel).await.unwrap();
        assert_eq!(message.packet_type, PacketType::Response);
        assert_eq!(&message.payload[..], b"abcdef");
        assert!(channel.is_valid());
    }

    #[tokio::test]
    async fn test_read_channel_mismatch_invalidates() {
        let (client, mut peer) = tokio::io::duplex(4096);
        let mut channel = Channel::new(client, ChannelOptions::default().id(1));
        let cancel = CancellationToken::new();

        peer.write_all(&raw_frame(PacketStatus::END_OF_MESSAGE, 5, b"x"))
            .await
            .unwrap();

        let err = channel.read_message(&cancel).await.unwrap_err();
        assert!(matches!(
            err,
            CodecError::ChannelMismatch {
                expected: 1,
                actual: 5
            }
        ));
        assert!(!channel.is_valid());
        assert!(matches!(
            channel.read_message(&cancel).await,
            Err(CodecError::ChannelInvalid)
        ));
    }

    #[tokio::test]
    async fn test_eof_before_end_of_message() {
        let (client, mut peer) = tokio::io::duplex(4096);
        let mut channel = Channel::new(client, ChannelOptions::default());
        let cancel = CancellationToken::new();

        peer.write_all(&raw_frame(PacketStatus::NORMAL, 0, b"partial"))
            .await
            .unwrap();
        drop(peer);

        assert!(matches!(
            channel.read_message(&cancel).await,
            Err(CodecError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_io_error() {
        let (client, mut peer) = tokio::io::duplex(4096);
        let mut channel = Channel::new(client, ChannelOptions::default());
        let cancel = CancellationToken::new();

        let frame = raw_frame(PacketStatus::END_OF_MESSAGE, 0, b"truncated");
        peer.write_all(&frame[..frame.len() - 3]).await.unwrap();
        drop(peer);

        assert!(matches!(
            channel.read_message(&cancel).await,
            Err(CodecError::Io(_))
        ));
        assert!(!channel.is_valid());
    }

    #[tokio::test]
    async fn test_cancel_pending_read() {
        let (client, _peer) = tokio::io::duplex(4096);
        let mut channel = Channel::new(client, ChannelOptions::default());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), channel.read_message(&cancel))
            .await
            .unwrap();
        assert!(matches!(result, Err(CodecError::Cancelled)));
        assert!(!channel.is_valid());
    }

    #[tokio::test]
    async fn test_cancelled_send_invalidates() {
        let (client, _peer) = tokio::io::duplex(4096);
        let mut channel = Channel::new(client, ChannelOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = channel
            .send_message(PacketType::Language, Bytes::from_static(b"select 1"), &cancel)
            .await;
        assert!(matches!(result, Err(CodecError::Cancelled)));
        assert!(matches!(
            channel
                .send_message(PacketType::Language, Bytes::new(), &CancellationToken::new())
                .await,
            Err(CodecError::ChannelInvalid)
        ));
    }

    #[tokio::test]
    async fn test_oversized_message_invalidates() {
        let transport = tokio_test::io::Builder::new()
            .read(&raw_frame(PacketStatus::NORMAL, 0, &[1u8; 40]))
            .read(&raw_frame(PacketStatus::NORMAL, 0, &[2u8; 40]))
            .build();
        let mut channel = Channel::new(transport, ChannelOptions::default().max_message_size(64));
        let cancel = CancellationToken::new();

        let err = channel.read_message(&cancel).await.unwrap_err();
        assert!(matches!(
            err,
            CodecError::MessageTooLarge { size: 80, max: 64 }
        ));
        assert!(!err.is_transport());
        assert!(!channel.is_valid());
    }

    #[tokio::test]
    async fn test_read_from_scripted_transport() {
        let transport = tokio_test::io::Builder::new()
            .read(&raw_frame(PacketStatus::NORMAL, 0, b"select"))
            .read(&raw_frame(PacketStatus::END_OF_MESSAGE, 0, b" 1"))
            .build();
        let mut channel = Channel::new(transport, ChannelOptions::default());

        let message = channel
            .read_message(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(&message.payload[..], b"select 1");
    }
}
