//! TDS 5.0 package definitions.
//!
//! A logical message received from the server is a sequence of packages.
//! Every package starts with a 1-byte type identifier followed by
//! type-specific data, most of them with a length prefix.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ase_protocol::package::{Package, PackageParser};
//! use bytes::Bytes;
//!
//! let data: Bytes = /* reassembled message */;
//! let mut parser = PackageParser::new(data);
//!
//! while let Some(package) = parser.next_package()? {
//!     match package {
//!         Package::Done(done) => println!("rows affected: {}", done.count),
//!         Package::Eed(eed) => eprintln!("{}: {}", eed.number, eed.message),
//!         _ => {}
//!     }
//! }
//! ```

use std::fmt;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{
    need, read_b_string, read_string, read_us_string, take_body, write_b_string,
    write_us_string,
};
use crate::error::ProtocolError;
use crate::format::{DataFormat, decode_formats, encode_formats};

/// Package type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PackageType {
    /// Language command (LANGUAGE).
    Language = 0x21,
    /// Return status (RETURNSTATUS).
    ReturnStatus = 0x79,
    /// Row data (ROW).
    Row = 0xD1,
    /// Parameter values (PARAMS).
    Params = 0xD7,
    /// Environment change (ENVCHANGE).
    EnvChange = 0xE3,
    /// Extended error data (EED).
    Eed = 0xE5,
    /// Dynamic statement (DYNAMIC).
    Dynamic = 0xE7,
    /// Parameter format (PARAMFMT).
    ParamFmt = 0xEC,
    /// Row format (ROWFMT).
    RowFmt = 0xEE,
    /// Done (DONE).
    Done = 0xFD,
    /// Done procedure (DONEPROC).
    DoneProc = 0xFE,
    /// Done in procedure (DONEINPROC).
    DoneInProc = 0xFF,
}

impl PackageType {
    /// Create a package type from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x21 => Some(Self::Language),
            0x79 => Some(Self::ReturnStatus),
            0xD1 => Some(Self::Row),
            0xD7 => Some(Self::Params),
            0xE3 => Some(Self::EnvChange),
            0xE5 => Some(Self::Eed),
            0xE7 => Some(Self::Dynamic),
            0xEC => Some(Self::ParamFmt),
            0xEE => Some(Self::RowFmt),
            0xFD => Some(Self::Done),
            0xFE => Some(Self::DoneProc),
            0xFF => Some(Self::DoneInProc),
            _ => None,
        }
    }

    /// Protocol name of the package type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Language => "LANGUAGE",
            Self::ReturnStatus => "RETURNSTATUS",
            Self::Row => "ROW",
            Self::Params => "PARAMS",
            Self::EnvChange => "ENVCHANGE",
            Self::Eed => "EED",
            Self::Dynamic => "DYNAMIC",
            Self::ParamFmt => "PARAMFMT",
            Self::RowFmt => "ROWFMT",
            Self::Done => "DONE",
            Self::DoneProc => "DONEPROC",
            Self::DoneInProc => "DONEINPROC",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), *self as u8)
    }
}

/// A decoded package.
///
/// The set is closed: consumers match exhaustively so that a new package kind
/// shows up as a compile error instead of being skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum Package {
    /// Column formats of an upcoming result set.
    RowFmt(RowFmt),
    /// One row of the current result set.
    Row(Row),
    /// End of a statement, procedure or command.
    Done(Done),
    /// Stored procedure return value.
    ReturnStatus(i32),
    /// Environment change notification.
    EnvChange(EnvChangePackage),
    /// Extended error or informational message.
    Eed(Eed),
    /// Language command.
    Language(Language),
    /// Dynamic statement operation.
    Dynamic(Dynamic),
    /// Parameter formats.
    ParamFmt(ParamFmt),
    /// Parameter values.
    Params(Params),
}

impl Package {
    /// Get the package type of this package.
    #[must_use]
    pub fn package_type(&self) -> PackageType {
        match self {
            Self::RowFmt(_) => PackageType::RowFmt,
            Self::Row(_) => PackageType::Row,
            Self::Done(done) => done.kind.package_type(),
            Self::ReturnStatus(_) => PackageType::ReturnStatus,
            Self::EnvChange(_) => PackageType::EnvChange,
            Self::Eed(_) => PackageType::Eed,
            Self::Language(_) => PackageType::Language,
            Self::Dynamic(_) => PackageType::Dynamic,
            Self::ParamFmt(_) => PackageType::ParamFmt,
            Self::Params(_) => PackageType::Params,
        }
    }

    /// Encode a sequence of packages into one message payload.
    ///
    /// `Row` and `Params` packages are encoded against the most recent
    /// `RowFmt` or `ParamFmt` in the same sequence.
    pub fn encode_all<'a>(
        packages: impl IntoIterator<Item = &'a Package>,
    ) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        let mut row_formats: Option<&[DataFormat]> = None;
        let mut param_formats: Option<&[DataFormat]> = None;

        for package in packages {
            match package {
                Package::RowFmt(fmt) => row_formats = Some(fmt.formats.as_slice()),
                Package::ParamFmt(fmt) => param_formats = Some(fmt.formats.as_slice()),
                _ => {}
            }
            package.encode(&mut buf, row_formats, param_formats)?;
        }

        Ok(buf.freeze())
    }

    /// Encode a single package.
    ///
    /// Row and parameter values need the formats they were described with.
    pub fn encode(
        &self,
        dst: &mut BytesMut,
        row_formats: Option<&[DataFormat]>,
        param_formats: Option<&[DataFormat]>,
    ) -> Result<(), ProtocolError> {
        match self {
            Self::RowFmt(fmt) => fmt.encode(dst),
            Self::Row(row) => {
                let formats = row_formats.ok_or(ProtocolError::MissingFormat("ROW"))?;
                dst.put_u8(PackageType::Row as u8);
                encode_values(&row.values, formats, dst)
            }
            Self::Done(done) => {
                done.encode(dst);
                Ok(())
            }
            Self::ReturnStatus(value) => {
                dst.put_u8(PackageType::ReturnStatus as u8);
                dst.put_i32_le(*value);
                Ok(())
            }
            Self::EnvChange(env) => env.encode(dst),
            Self::Eed(eed) => eed.encode(dst),
            Self::Language(lang) => lang.encode(dst),
            Self::Dynamic(dynamic) => dynamic.encode(dst),
            Self::ParamFmt(fmt) => fmt.encode(dst),
            Self::Params(params) => {
                let formats = param_formats.ok_or(ProtocolError::MissingFormat("PARAMS"))?;
                dst.put_u8(PackageType::Params as u8);
                encode_values(&params.values, formats, dst)
            }
        }
    }
}

// Length-prefixed body helpers

fn put_u16_body(
    dst: &mut BytesMut,
    package: PackageType,
    body: &[u8],
) -> Result<(), ProtocolError> {
    let len = u16::try_from(body.len()).map_err(|_| ProtocolError::FieldTooLong {
        field: package.name(),
        len: body.len(),
        max: u16::MAX as usize,
    })?;
    dst.put_u8(package as u8);
    dst.put_u16_le(len);
    dst.put_slice(body);
    Ok(())
}

fn u16_body(src: &mut impl Buf, package: PackageType) -> Result<Bytes, ProtocolError> {
    need(src, 2)?;
    let len = src.get_u16_le() as usize;
    take_body(src, package.name(), len)
}

fn finish_body(body: &Bytes, package: PackageType, declared: usize) -> Result<(), ProtocolError> {
    if body.has_remaining() {
        return Err(ProtocolError::LengthMismatch {
            package: package.name(),
            declared,
            actual: declared - body.remaining(),
        });
    }
    Ok(())
}

fn decode_values(
    src: &mut impl Buf,
    formats: &[DataFormat],
) -> Result<Vec<Option<Bytes>>, ProtocolError> {
    formats.iter().map(|format| format.decode_value(src)).collect()
}

fn encode_values(
    values: &[Option<Bytes>],
    formats: &[DataFormat],
    dst: &mut BytesMut,
) -> Result<(), ProtocolError> {
    if values.len() != formats.len() {
        return Err(ProtocolError::LengthMismatch {
            package: "values",
            declared: formats.len(),
            actual: values.len(),
        });
    }
    for (value, format) in values.iter().zip(formats) {
        format.encode_value(value.as_deref(), dst)?;
    }
    Ok(())
}

/// Row format package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowFmt {
    /// Column formats, in column order.
    pub formats: Vec<DataFormat>,
}

impl RowFmt {
    /// Create a row format from column formats.
    #[must_use]
    pub fn new(formats: Vec<DataFormat>) -> Self {
        Self { formats }
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.formats.len()
    }

    /// Decode the body following the type byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut body = u16_body(src, PackageType::RowFmt)?;
        let declared = body.len();
        let formats = decode_formats(&mut body)?;
        finish_body(&body, PackageType::RowFmt, declared)?;
        Ok(Self { formats })
    }

    /// Encode including the type byte.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        encode_formats(&self.formats, &mut body)?;
        put_u16_body(dst, PackageType::RowFmt, &body)
    }
}

/// Parameter format package.
///
/// Shares its layout with [`RowFmt`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParamFmt {
    /// Parameter formats, in parameter order.
    pub formats: Vec<DataFormat>,
}

impl ParamFmt {
    /// Create a parameter format from formats.
    #[must_use]
    pub fn new(formats: Vec<DataFormat>) -> Self {
        Self { formats }
    }

    /// Decode the body following the type byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut body = u16_body(src, PackageType::ParamFmt)?;
        let declared = body.len();
        let formats = decode_formats(&mut body)?;
        finish_body(&body, PackageType::ParamFmt, declared)?;
        Ok(Self { formats })
    }

    /// Encode including the type byte.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        encode_formats(&self.formats, &mut body)?;
        put_u16_body(dst, PackageType::ParamFmt, &body)
    }
}

/// Row data package.
///
/// Values stay raw; `None` is NULL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    /// Raw column values.
    pub values: Vec<Option<Bytes>>,
}

impl Row {
    /// Decode a row described by `format`.
    pub fn decode(src: &mut impl Buf, format: &RowFmt) -> Result<Self, ProtocolError> {
        Ok(Self {
            values: decode_values(src, &format.formats)?,
        })
    }

    /// Get a raw value by column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.values.get(index).and_then(|v| v.as_deref())
    }
}

/// Parameter values package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    /// Raw parameter values.
    pub values: Vec<Option<Bytes>>,
}

impl Params {
    /// Decode values described by `format`.
    pub fn decode(src: &mut impl Buf, format: &ParamFmt) -> Result<Self, ProtocolError> {
        Ok(Self {
            values: decode_values(src, &format.formats)?,
        })
    }
}

bitflags! {
    /// Done package status flags.
    ///
    /// `FINAL` is the absence of any other bit on real servers; it is kept
    /// as an explicit flag here so the terminal state can be tested directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DoneStatus: u16 {
        /// More results follow in this reply.
        const MORE = 0x0001;
        /// The statement failed.
        const ERROR = 0x0002;
        /// A transaction is in progress.
        const IN_XACT = 0x0004;
        /// End of a stored procedure.
        const PROC = 0x0008;
        /// The count field is valid.
        const COUNT = 0x0010;
        /// Acknowledges an attention.
        const ATTN = 0x0020;
        /// Event notification.
        const EVENT = 0x0040;
        /// End of a top-level command.
        const FINAL = 0x0080;
    }
}

impl DoneStatus {
    /// Count field is valid.
    #[must_use]
    pub const fn is_count(self) -> bool {
        self.contains(Self::COUNT)
    }

    /// More results follow.
    #[must_use]
    pub const fn is_more(self) -> bool {
        self.contains(Self::MORE)
    }

    /// End of a stored procedure.
    #[must_use]
    pub const fn is_proc(self) -> bool {
        self.contains(Self::PROC)
    }

    /// End of a top-level command.
    #[must_use]
    pub const fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    /// Statement failed.
    #[must_use]
    pub const fn is_error(self) -> bool {
        self.contains(Self::ERROR)
    }

    /// Ends a command's reply: `PROC` or `FINAL` without `MORE`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_more() && (self.is_proc() || self.is_final())
    }
}

/// Which of the three done packages was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DoneKind {
    /// DONE.
    #[default]
    Done,
    /// DONEPROC.
    Proc,
    /// DONEINPROC.
    InProc,
}

impl DoneKind {
    /// Package type carrying this kind.
    #[must_use]
    pub const fn package_type(self) -> PackageType {
        match self {
            Self::Done => PackageType::Done,
            Self::Proc => PackageType::DoneProc,
            Self::InProc => PackageType::DoneInProc,
        }
    }
}

/// Done package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Done {
    /// Which done package this is.
    pub kind: DoneKind,
    /// Status flags.
    pub status: DoneStatus,
    /// Transaction state.
    pub tran_state: u16,
    /// Rows affected, valid if `COUNT` is set.
    pub count: i32,
}

impl Done {
    /// Size of the body following the type byte.
    pub const SIZE: usize = 8;

    /// Create a DONE package.
    #[must_use]
    pub fn new(status: DoneStatus, count: i32) -> Self {
        Self {
            kind: DoneKind::Done,
            status,
            tran_state: 0,
            count,
        }
    }

    /// Set the kind.
    #[must_use]
    pub fn with_kind(mut self, kind: DoneKind) -> Self {
        self.kind = kind;
        self
    }

    /// Decode the body following the type byte.
    pub fn decode(src: &mut impl Buf, kind: DoneKind) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::IncompletePackage {
                package: kind.package_type().name(),
                expected: Self::SIZE,
                actual: src.remaining(),
            });
        }

        Ok(Self {
            kind,
            status: DoneStatus::from_bits_retain(src.get_u16_le()),
            tran_state: src.get_u16_le(),
            count: src.get_i32_le(),
        })
    }

    /// Encode including the type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.kind.package_type() as u8);
        dst.put_u16_le(self.status.bits());
        dst.put_u16_le(self.tran_state);
        dst.put_i32_le(self.count);
    }
}

/// Environment change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EnvChangeType {
    /// Current database.
    Database = 1,
    /// Language.
    Language = 2,
    /// Character set.
    CharSet = 3,
    /// Network packet size.
    PacketSize = 4,
}

impl EnvChangeType {
    /// Create from a raw byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::Database),
            2 => Ok(Self::Language),
            3 => Ok(Self::CharSet),
            4 => Ok(Self::PacketSize),
            other => Err(ProtocolError::UnknownEnvChangeType(other)),
        }
    }
}

/// A single environment change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvChange {
    /// What changed.
    pub env_type: EnvChangeType,
    /// New value.
    pub new_value: String,
    /// Previous value.
    pub old_value: String,
}

impl EnvChange {
    /// Create an environment change.
    #[must_use]
    pub fn new(
        env_type: EnvChangeType,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            env_type,
            new_value: new_value.into(),
            old_value: old_value.into(),
        }
    }
}

/// Environment change package; one package may carry several changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvChangePackage {
    /// Changes in wire order.
    pub changes: Vec<EnvChange>,
}

impl EnvChangePackage {
    /// Create a package from changes.
    #[must_use]
    pub fn new(changes: Vec<EnvChange>) -> Self {
        Self { changes }
    }

    /// Decode the body following the type byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut body = u16_body(src, PackageType::EnvChange)?;
        let mut changes = Vec::new();

        while body.has_remaining() {
            let env_type = EnvChangeType::from_u8(body.get_u8())?;
            let new_value = read_b_string(&mut body)?;
            let old_value = read_b_string(&mut body)?;
            changes.push(EnvChange {
                env_type,
                new_value,
                old_value,
            });
        }

        Ok(Self { changes })
    }

    /// Encode including the type byte.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        for change in &self.changes {
            body.put_u8(change.env_type as u8);
            write_b_string(&mut body, "new value", &change.new_value)?;
            write_b_string(&mut body, "old value", &change.old_value)?;
        }
        put_u16_body(dst, PackageType::EnvChange, &body)
    }
}

/// Extended error data: a server error or informational message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Eed {
    /// Message number.
    pub number: i32,
    /// Error state.
    pub state: u8,
    /// Severity class.
    pub severity: u8,
    /// SQL state.
    pub sql_state: Vec<u8>,
    /// Status flags.
    pub status: u8,
    /// Transaction state.
    pub tran_state: u16,
    /// Message text.
    pub message: String,
    /// Server name.
    pub server: String,
    /// Stored procedure name.
    pub procedure: String,
    /// Line number.
    pub line: u16,
}

impl Eed {
    /// Severities above this are errors, at or below are informational.
    pub const MAX_INFO_SEVERITY: u8 = 10;

    /// Create a message with number, severity and text.
    #[must_use]
    pub fn new(number: i32, severity: u8, message: impl Into<String>) -> Self {
        Self {
            number,
            severity,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Check if this message reports an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity > Self::MAX_INFO_SEVERITY
    }

    /// Decode the body following the type byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut body = u16_body(src, PackageType::Eed)?;
        let declared = body.len();

        need(&body, 7)?;
        let number = body.get_i32_le();
        let state = body.get_u8();
        let severity = body.get_u8();
        let sql_state_len = body.get_u8() as usize;
        need(&body, sql_state_len)?;
        let sql_state = body.copy_to_bytes(sql_state_len).to_vec();
        need(&body, 3)?;
        let status = body.get_u8();
        let tran_state = body.get_u16_le();
        let message = read_us_string(&mut body)?;
        let server = read_b_string(&mut body)?;
        let procedure = read_b_string(&mut body)?;
        need(&body, 2)?;
        let line = body.get_u16_le();

        finish_body(&body, PackageType::Eed, declared)?;

        Ok(Self {
            number,
            state,
            severity,
            sql_state,
            status,
            tran_state,
            message,
            server,
            procedure,
            line,
        })
    }

    /// Encode including the type byte.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        body.put_i32_le(self.number);
        body.put_u8(self.state);
        body.put_u8(self.severity);
        let sql_state_len =
            u8::try_from(self.sql_state.len()).map_err(|_| ProtocolError::FieldTooLong {
                field: "sql state",
                len: self.sql_state.len(),
                max: u8::MAX as usize,
            })?;
        body.put_u8(sql_state_len);
        body.put_slice(&self.sql_state);
        body.put_u8(self.status);
        body.put_u16_le(self.tran_state);
        write_us_string(&mut body, "message", &self.message)?;
        write_b_string(&mut body, "server name", &self.server)?;
        write_b_string(&mut body, "procedure name", &self.procedure)?;
        body.put_u16_le(self.line);
        put_u16_body(dst, PackageType::Eed, &body)
    }
}

impl fmt::Display for Eed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Msg {}, Level {}, State {}: {}",
            self.number, self.severity, self.state, self.message
        )
    }
}

/// Language command package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Language {
    /// Parameters follow the command.
    pub has_args: bool,
    /// Command text.
    pub text: String,
}

impl Language {
    const STATUS_HASARGS: u8 = 0x01;

    /// Create a language command without parameters.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            has_args: false,
            text: text.into(),
        }
    }

    /// Decode the body following the type byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        need(src, 4)?;
        let len = src.get_u32_le() as usize;
        let mut body = take_body(src, PackageType::Language.name(), len)?;
        need(&body, 1)?;
        let status = body.get_u8();
        let text_len = body.remaining();
        let text = read_string(&mut body, text_len)?;
        Ok(Self {
            has_args: status & Self::STATUS_HASARGS != 0,
            text,
        })
    }

    /// Encode including the type byte.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let len = u32::try_from(self.text.len() + 1).map_err(|_| ProtocolError::FieldTooLong {
            field: "language text",
            len: self.text.len(),
            max: u32::MAX as usize - 1,
        })?;
        dst.put_u8(PackageType::Language as u8);
        dst.put_u32_le(len);
        dst.put_u8(if self.has_args { Self::STATUS_HASARGS } else { 0 });
        dst.put_slice(self.text.as_bytes());
        Ok(())
    }
}

/// Dynamic statement operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DynamicOp {
    /// Prepare a statement.
    Prepare = 0x01,
    /// Execute a prepared statement.
    Exec = 0x02,
    /// Deallocate a prepared statement.
    Dealloc = 0x04,
    /// Prepare and execute in one step.
    ExecImmed = 0x08,
    /// Procedure name.
    ProcName = 0x10,
    /// Server acknowledgement.
    Ack = 0x20,
    /// Describe input parameters.
    DescIn = 0x40,
    /// Describe output columns.
    DescOut = 0x80,
}

impl DynamicOp {
    /// Create from a raw byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Self::Prepare),
            0x02 => Ok(Self::Exec),
            0x04 => Ok(Self::Dealloc),
            0x08 => Ok(Self::ExecImmed),
            0x10 => Ok(Self::ProcName),
            0x20 => Ok(Self::Ack),
            0x40 => Ok(Self::DescIn),
            0x80 => Ok(Self::DescOut),
            other => Err(ProtocolError::UnknownDynamicOperation(other)),
        }
    }

    /// Whether this operation carries statement text.
    #[must_use]
    pub const fn has_statement(self) -> bool {
        matches!(self, Self::Prepare | Self::ExecImmed)
    }
}

/// Dynamic statement package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dynamic {
    /// Operation.
    pub op: DynamicOp,
    /// Parameters follow the package.
    pub has_args: bool,
    /// Statement identifier.
    pub id: String,
    /// Statement text for prepare operations.
    pub statement: Option<String>,
}

impl Dynamic {
    const STATUS_HASARGS: u8 = 0x01;

    /// Prepare `query` under `id`.
    #[must_use]
    pub fn prepare(id: impl Into<String>, query: &str) -> Self {
        let id = id.into();
        let statement = format!("create proc {id} as {query}");
        Self {
            op: DynamicOp::Prepare,
            has_args: false,
            id,
            statement: Some(statement),
        }
    }

    /// Execute the statement `id` with parameters.
    #[must_use]
    pub fn exec(id: impl Into<String>) -> Self {
        Self {
            op: DynamicOp::Exec,
            has_args: true,
            id: id.into(),
            statement: None,
        }
    }

    /// Deallocate the statement `id`.
    #[must_use]
    pub fn dealloc(id: impl Into<String>) -> Self {
        Self {
            op: DynamicOp::Dealloc,
            has_args: false,
            id: id.into(),
            statement: None,
        }
    }

    /// Server acknowledgement for `id`.
    #[must_use]
    pub fn ack(id: impl Into<String>) -> Self {
        Self {
            op: DynamicOp::Ack,
            has_args: false,
            id: id.into(),
            statement: None,
        }
    }

    /// Decode the body following the type byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut body = u16_body(src, PackageType::Dynamic)?;
        let declared = body.len();

        need(&body, 2)?;
        let op = DynamicOp::from_u8(body.get_u8())?;
        let status = body.get_u8();
        let id = read_b_string(&mut body)?;
        let statement = if op.has_statement() {
            Some(read_us_string(&mut body)?)
        } else {
            None
        };

        finish_body(&body, PackageType::Dynamic, declared)?;

        Ok(Self {
            op,
            has_args: status & Self::STATUS_HASARGS != 0,
            id,
            statement,
        })
    }

    /// Encode including the type byte.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        body.put_u8(self.op as u8);
        body.put_u8(if self.has_args { Self::STATUS_HASARGS } else { 0 });
        write_b_string(&mut body, "statement id", &self.id)?;
        if self.op.has_statement() {
            write_us_string(
                &mut body,
                "statement text",
                self.statement.as_deref().unwrap_or_default(),
            )?;
        }
        put_u16_body(dst, PackageType::Dynamic, &body)
    }
}

/// Parser for a package stream.
///
/// Keeps the last row and parameter formats so that `ROW` and `PARAMS`
/// packages can be decoded. The formats survive across [`feed`](Self::feed)
/// calls since a result set may span several messages.
#[derive(Debug, Default)]
pub struct PackageParser {
    data: Bytes,
    row_format: Option<RowFmt>,
    param_format: Option<ParamFmt>,
}

impl PackageParser {
    /// Create a parser over `data`.
    #[must_use]
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            row_format: None,
            param_format: None,
        }
    }

    /// Replace the unparsed data, keeping the format context.
    pub fn feed(&mut self, data: Bytes) {
        self.data = data;
    }

    /// Get remaining bytes in the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Check if there are more bytes to parse.
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        !self.data.is_empty()
    }

    /// Active row format.
    #[must_use]
    pub fn row_format(&self) -> Option<&RowFmt> {
        self.row_format.as_ref()
    }

    /// Active parameter format.
    #[must_use]
    pub fn param_format(&self) -> Option<&ParamFmt> {
        self.param_format.as_ref()
    }

    /// Peek at the next package type without consuming it.
    #[must_use]
    pub fn peek_package_type(&self) -> Option<PackageType> {
        self.data.first().copied().and_then(PackageType::from_u8)
    }

    /// Parse the next package.
    ///
    /// Returns `None` once the buffer is exhausted. On error the parser
    /// position is unspecified.
    pub fn next_package(&mut self) -> Result<Option<Package>, ProtocolError> {
        if self.data.is_empty() {
            return Ok(None);
        }

        let buf = &mut self.data;
        let type_byte = buf.get_u8();
        let package_type =
            PackageType::from_u8(type_byte).ok_or(ProtocolError::UnknownPackageType(type_byte))?;

        let package = match package_type {
            PackageType::RowFmt => {
                let fmt = RowFmt::decode(buf)?;
                self.row_format = Some(fmt.clone());
                Package::RowFmt(fmt)
            }
            PackageType::Row => {
                let fmt = self
                    .row_format
                    .as_ref()
                    .ok_or(ProtocolError::MissingFormat("ROW"))?;
                Package::Row(Row::decode(buf, fmt)?)
            }
            PackageType::ParamFmt => {
                let fmt = ParamFmt::decode(buf)?;
                self.param_format = Some(fmt.clone());
                Package::ParamFmt(fmt)
            }
            PackageType::Params => {
                let fmt = self
                    .param_format
                    .as_ref()
                    .ok_or(ProtocolError::MissingFormat("PARAMS"))?;
                Package::Params(Params::decode(buf, fmt)?)
            }
            PackageType::Done => Package::Done(Done::decode(buf, DoneKind::Done)?),
            PackageType::DoneProc => Package::Done(Done::decode(buf, DoneKind::Proc)?),
            PackageType::DoneInProc => Package::Done(Done::decode(buf, DoneKind::InProc)?),
            PackageType::ReturnStatus => {
                if buf.remaining() < 4 {
                    return Err(ProtocolError::IncompletePackage {
                        package: PackageType::ReturnStatus.name(),
                        expected: 4,
                        actual: buf.remaining(),
                    });
                }
                Package::ReturnStatus(buf.get_i32_le())
            }
            PackageType::EnvChange => Package::EnvChange(EnvChangePackage::decode(buf)?),
            PackageType::Eed => Package::Eed(Eed::decode(buf)?),
            PackageType::Language => Package::Language(Language::decode(buf)?),
            PackageType::Dynamic => Package::Dynamic(Dynamic::decode(buf)?),
        };

        Ok(Some(package))
    }
}
