//! Parameter encoding.
//!
//! Every parameter is sent in a nullable wire format so that NULL can be bound
//! without changing the statement's parameter formats.

use ase_protocol::format::{DataFormat, DataType, format_status};
use ase_protocol::package::{ParamFmt, Params};
use bytes::Bytes;

use crate::error::TypeError;
use crate::value::SqlValue;

/// Longest value sent as VARCHAR or VARBINARY.
pub const SHORT_VALUE_MAX: usize = 255;

/// Encode a value into a parameter format and its raw bytes.
///
/// `None` is NULL. Empty strings and binaries are sent as a single space and a
/// single zero byte, since a zero length means NULL on the wire.
pub fn encode_param(value: &SqlValue) -> Result<(DataFormat, Option<Bytes>), TypeError> {
    let (format, raw) = match value {
        SqlValue::Null => (nullable(DataType::VarChar, SHORT_VALUE_MAX as u32), None),
        SqlValue::Bool(v) => (
            DataFormat::new(DataType::Bit),
            Some(Bytes::copy_from_slice(&[u8::from(*v)])),
        ),
        SqlValue::TinyInt(v) => (nullable(DataType::IntN, 1), Some(Bytes::copy_from_slice(&[*v]))),
        SqlValue::SmallInt(v) => (
            nullable(DataType::IntN, 2),
            Some(Bytes::copy_from_slice(&v.to_le_bytes())),
        ),
        SqlValue::Int(v) => (
            nullable(DataType::IntN, 4),
            Some(Bytes::copy_from_slice(&v.to_le_bytes())),
        ),
        SqlValue::BigInt(v) => (
            nullable(DataType::IntN, 8),
            Some(Bytes::copy_from_slice(&v.to_le_bytes())),
        ),
        SqlValue::Float(v) => (
            nullable(DataType::FltN, 4),
            Some(Bytes::copy_from_slice(&v.to_le_bytes())),
        ),
        SqlValue::Double(v) => (
            nullable(DataType::FltN, 8),
            Some(Bytes::copy_from_slice(&v.to_le_bytes())),
        ),
        SqlValue::String(s) => {
            let raw = if s.is_empty() {
                Bytes::from_static(b" ")
            } else {
                Bytes::copy_from_slice(s.as_bytes())
            };
            (variable(DataType::VarChar, DataType::LongChar, raw.len())?, Some(raw))
        }
        SqlValue::Binary(b) => {
            let raw = if b.is_empty() {
                Bytes::from_static(&[0])
            } else {
                b.clone()
            };
            (
                variable(DataType::VarBinary, DataType::LongBinary, raw.len())?,
                Some(raw),
            )
        }
    };

    Ok((format, raw))
}

/// Encode a list of values into the parameter format and values packages.
pub fn encode_params(values: &[SqlValue]) -> Result<(ParamFmt, Params), TypeError> {
    let mut formats = Vec::with_capacity(values.len());
    let mut raw = Vec::with_capacity(values.len());

    for value in values {
        let (format, bytes) = encode_param(value)?;
        formats.push(format);
        raw.push(bytes);
    }

    Ok((ParamFmt::new(formats), Params { values: raw }))
}

fn nullable(data_type: DataType, max_length: u32) -> DataFormat {
    DataFormat::new(data_type)
        .with_max_length(max_length)
        .with_status(format_status::NULLABLE)
}

fn variable(short: DataType, long: DataType, len: usize) -> Result<DataFormat, TypeError> {
    if len <= SHORT_VALUE_MAX {
        return Ok(nullable(short, SHORT_VALUE_MAX as u32));
    }
    let max = u32::try_from(len).map_err(|_| TypeError::ValueTooLong { len })?;
    Ok(nullable(long, max))
}
