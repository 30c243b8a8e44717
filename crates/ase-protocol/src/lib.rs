//! # ase-protocol
//!
//! Implementation of the TDS 5.0 (Tabular Data Stream) wire format spoken by
//! SAP Adaptive Server Enterprise.
//!
//! This crate provides the packet header codec, the package model found in
//! reassembled messages and the column format descriptions shared by row and
//! parameter data.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic and
//! makes no assumptions about the async runtime. Higher-level crates build upon
//! this foundation to provide async I/O capabilities.
//!
//! ## Example
//!
//! ```rust
//! use ase_protocol::{PacketHeader, PacketStatus, PacketType};
//!
//! let header = PacketHeader::new(PacketType::Language, PacketStatus::END_OF_MESSAGE, 100)
//!     .with_channel(0)
//!     .with_packet_nr(1);
//!
//! let mut buf = [0u8; 8];
//! header.encode(&mut buf).unwrap();
//! assert_eq!(PacketHeader::decode(&buf).unwrap(), header);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod format;
pub mod package;
pub mod packet;

pub use error::ProtocolError;
pub use format::{DataFormat, DataType, LengthKind, format_status};
pub use package::{
    Done, DoneKind, DoneStatus, Dynamic, DynamicOp, Eed, EnvChange, EnvChangePackage,
    EnvChangeType, Language, Package, PackageParser, PackageType, ParamFmt, Params, Row, RowFmt,
};
pub use packet::{
    MAX_PACKET_SIZE, PACKET_BODY_SIZE, PACKET_HEADER_SIZE, PACKET_SIZE, PacketHeader,
    PacketStatus, PacketType,
};
