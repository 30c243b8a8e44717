//! # ase-codec
//!
//! Async framing layer for TDS 5.0.
//!
//! This crate turns raw byte streams into frames, reassembles frames into
//! logical messages and provides [`Channel`], which owns the per-channel
//! sequence number and window credit.
//!
//! ## Architecture
//!
//! ```text
//! Transport → FrameCodec (frame framing) → MessageAssembler → Channel → Client
//! ```
//!
//! The transport is split into read and write halves. Every blocking
//! operation takes a [`CancellationToken`](tokio_util::sync::CancellationToken);
//! cancelling it aborts the operation and invalidates the channel.
//!
//! ```rust,ignore
//! use ase_codec::{Channel, ChannelOptions};
//! use ase_protocol::PacketType;
//! use tokio_util::sync::CancellationToken;
//!
//! let mut channel = Channel::new(tcp_stream, ChannelOptions::default());
//! let cancel = CancellationToken::new();
//! channel.send_message(PacketType::Language, payload, &cancel).await?;
//! let reply = channel.read_message(&cancel).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod channel;
pub mod error;
pub mod frame_codec;
pub mod framed;
pub mod message;

pub use channel::{Channel, ChannelOptions, MIN_PACKET_SIZE};
pub use error::CodecError;
pub use frame_codec::{Frame, FrameCodec};
pub use framed::{FrameReader, FrameWriter};
pub use message::{DEFAULT_MAX_MESSAGE_SIZE, Message, MessageAssembler};
