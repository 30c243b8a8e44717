//! Data type and column format definitions.
//!
//! Row formats and parameter formats share the same per-column layout:
//!
//! ```text
//! name (b_string) | status (u8) | user type (i32) | data type (u8)
//!   | length info (depends on data type) | locale (b_string)
//! ```
//!
//! Only the length information needed to walk row and parameter data is
//! interpreted here. Turning the raw bytes into values is left to the
//! type-conversion layer.

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{need, read_b_string, read_bytes, write_b_string};
use crate::error::ProtocolError;

/// How a data type's length is described in a format and prefixed in data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthKind {
    /// Fixed number of bytes, no length in format or data.
    Fixed(usize),
    /// 1-byte maximum length in the format, 1-byte length before each value.
    Byte,
    /// 4-byte maximum length in the format, 4-byte length before each value.
    Long,
    /// 1-byte length, precision and scale in the format, 1-byte value length.
    Decimal,
    /// 4-byte length and table name in the format, text pointer in data.
    Text,
}

/// TDS 5.0 data type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// 8-bit unsigned integer.
    Int1 = 0x30,
    /// 16-bit signed integer.
    Int2 = 0x34,
    /// 32-bit signed integer.
    Int4 = 0x38,
    /// 64-bit signed integer.
    Int8 = 0xBF,
    /// 16-bit unsigned integer.
    Uint2 = 0x41,
    /// 32-bit unsigned integer.
    Uint4 = 0x42,
    /// 64-bit unsigned integer.
    Uint8 = 0x43,
    /// Nullable signed integer of 1, 2, 4 or 8 bytes.
    IntN = 0x26,
    /// Nullable unsigned integer of 1, 2, 4 or 8 bytes.
    UintN = 0x44,
    /// 32-bit float.
    Flt4 = 0x3B,
    /// 64-bit float.
    Flt8 = 0x3E,
    /// Nullable float of 4 or 8 bytes.
    FltN = 0x6D,
    /// Bit.
    Bit = 0x32,
    /// 8-byte datetime.
    DateTime = 0x3D,
    /// 4-byte small datetime.
    ShortDate = 0x3A,
    /// Nullable datetime.
    DateTimeN = 0x6F,
    /// Date.
    Date = 0x31,
    /// Time.
    Time = 0x33,
    /// Nullable date.
    DateN = 0x7B,
    /// Nullable time.
    TimeN = 0x93,
    /// 8-byte money.
    Money = 0x3C,
    /// 4-byte money.
    ShortMoney = 0x7A,
    /// Nullable money.
    MoneyN = 0x6E,
    /// Fixed-length character.
    Char = 0x2F,
    /// Variable-length character.
    VarChar = 0x27,
    /// Long character data.
    LongChar = 0xAF,
    /// Fixed-length binary.
    Binary = 0x2D,
    /// Variable-length binary.
    VarBinary = 0x25,
    /// Long binary data.
    LongBinary = 0xE1,
    /// Numeric.
    NumN = 0x6C,
    /// Decimal.
    DecN = 0x6A,
    /// Text.
    Text = 0x23,
    /// Image.
    Image = 0x22,
}

impl DataType {
    /// Create a data type from a raw byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x30 => Self::Int1,
            0x34 => Self::Int2,
            0x38 => Self::Int4,
            0xBF => Self::Int8,
            0x41 => Self::Uint2,
            0x42 => Self::Uint4,
            0x43 => Self::Uint8,
            0x26 => Self::IntN,
            0x44 => Self::UintN,
            0x3B => Self::Flt4,
            0x3E => Self::Flt8,
            0x6D => Self::FltN,
            0x32 => Self::Bit,
            0x3D => Self::DateTime,
            0x3A => Self::ShortDate,
            0x6F => Self::DateTimeN,
            0x31 => Self::Date,
            0x33 => Self::Time,
            0x7B => Self::DateN,
            0x93 => Self::TimeN,
            0x3C => Self::Money,
            0x7A => Self::ShortMoney,
            0x6E => Self::MoneyN,
            0x2F => Self::Char,
            0x27 => Self::VarChar,
            0xAF => Self::LongChar,
            0x2D => Self::Binary,
            0x25 => Self::VarBinary,
            0xE1 => Self::LongBinary,
            0x6C => Self::NumN,
            0x6A => Self::DecN,
            0x23 => Self::Text,
            0x22 => Self::Image,
            other => return Err(ProtocolError::UnknownDataType(other)),
        })
    }

    /// Length encoding used by this type.
    #[must_use]
    pub const fn length_kind(self) -> LengthKind {
        match self {
            Self::Int1 | Self::Bit => LengthKind::Fixed(1),
            Self::Int2 | Self::Uint2 => LengthKind::Fixed(2),
            Self::Int4
            | Self::Uint4
            | Self::Flt4
            | Self::ShortDate
            | Self::ShortMoney
            | Self::Date
            | Self::Time => LengthKind::Fixed(4),
            Self::Int8 | Self::Uint8 | Self::Flt8 | Self::DateTime | Self::Money => {
                LengthKind::Fixed(8)
            }
            Self::IntN
            | Self::UintN
            | Self::FltN
            | Self::DateTimeN
            | Self::DateN
            | Self::TimeN
            | Self::MoneyN
            | Self::Char
            | Self::VarChar
            | Self::Binary
            | Self::VarBinary => LengthKind::Byte,
            Self::LongChar | Self::LongBinary => LengthKind::Long,
            Self::NumN | Self::DecN => LengthKind::Decimal,
            Self::Text | Self::Image => LengthKind::Text,
        }
    }
}

/// Format of a single column or parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFormat {
    /// Column or parameter name, possibly empty.
    pub name: String,
    /// Status bits (nullable, updatable, output parameter...).
    pub status: u8,
    /// Server user type.
    pub user_type: i32,
    /// Wire data type.
    pub data_type: DataType,
    /// Maximum length for variable-length types.
    pub max_length: u32,
    /// Precision for numeric types.
    pub precision: u8,
    /// Scale for numeric types.
    pub scale: u8,
    /// Table name for text and image columns.
    pub table_name: String,
    /// Locale information.
    pub locale: String,
}

/// Column and parameter status bits.
pub mod format_status {
    /// Parameter is an output parameter.
    pub const PARAM_OUTPUT: u8 = 0x01;
    /// Column may contain NULL.
    pub const NULLABLE: u8 = 0x20;
}

impl DataFormat {
    /// Create a format for `data_type` with default attributes.
    #[must_use]
    pub fn new(data_type: DataType) -> Self {
        let max_length = match data_type.length_kind() {
            LengthKind::Fixed(n) => n as u32,
            _ => 0,
        };
        Self {
            name: String::new(),
            status: 0,
            user_type: 0,
            data_type,
            max_length,
            precision: 0,
            scale: 0,
            table_name: String::new(),
            locale: String::new(),
        }
    }

    /// Set the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the maximum length.
    #[must_use]
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the status bits.
    #[must_use]
    pub fn with_status(mut self, status: u8) -> Self {
        self.status = status;
        self
    }

    /// Check if the column allows NULL.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.status & format_status::NULLABLE != 0
    }

    /// Decode one format entry.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let name = read_b_string(src)?;
        need(src, 6)?;
        let status = src.get_u8();
        let user_type = src.get_i32_le();
        let data_type = DataType::from_u8(src.get_u8())?;

        let mut format = Self::new(data_type).with_name(name).with_status(status);
        format.user_type = user_type;

        match data_type.length_kind() {
            LengthKind::Fixed(_) => {}
            LengthKind::Byte => {
                need(src, 1)?;
                format.max_length = u32::from(src.get_u8());
            }
            LengthKind::Long => {
                need(src, 4)?;
                format.max_length = src.get_u32_le();
            }
            LengthKind::Decimal => {
                need(src, 3)?;
                format.max_length = u32::from(src.get_u8());
                format.precision = src.get_u8();
                format.scale = src.get_u8();
            }
            LengthKind::Text => {
                need(src, 6)?;
                format.max_length = src.get_u32_le();
                let name_len = src.get_u16_le() as usize;
                format.table_name =
                    String::from_utf8_lossy(&read_bytes(src, name_len)?).into_owned();
            }
        }

        format.locale = read_b_string(src)?;
        Ok(format)
    }

    /// Encode one format entry.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<(), ProtocolError> {
        write_b_string(dst, "format name", &self.name)?;
        dst.put_u8(self.status);
        dst.put_i32_le(self.user_type);
        dst.put_u8(self.data_type as u8);

        match self.data_type.length_kind() {
            LengthKind::Fixed(_) => {}
            LengthKind::Byte => dst.put_u8(u8::try_from(self.max_length).unwrap_or(u8::MAX)),
            LengthKind::Long => dst.put_u32_le(self.max_length),
            LengthKind::Decimal => {
                dst.put_u8(u8::try_from(self.max_length).unwrap_or(u8::MAX));
                dst.put_u8(self.precision);
                dst.put_u8(self.scale);
            }
            LengthKind::Text => {
                dst.put_u32_le(self.max_length);
                let name_len =
                    u16::try_from(self.table_name.len()).map_err(|_| ProtocolError::FieldTooLong {
                        field: "table name",
                        len: self.table_name.len(),
                        max: u16::MAX as usize,
                    })?;
                dst.put_u16_le(name_len);
                dst.put_slice(self.table_name.as_bytes());
            }
        }

        write_b_string(dst, "locale", &self.locale)
    }

    /// Read one value in this format from row or parameter data.
    ///
    /// Returns `None` for NULL.
    pub fn decode_value(&self, src: &mut impl Buf) -> Result<Option<Bytes>, ProtocolError> {
        match self.data_type.length_kind() {
            LengthKind::Fixed(n) => read_bytes(src, n).map(Some),
            LengthKind::Byte | LengthKind::Decimal => {
                need(src, 1)?;
                let len = src.get_u8() as usize;
                if len == 0 {
                    return Ok(None);
                }
                read_bytes(src, len).map(Some)
            }
            LengthKind::Long => {
                need(src, 4)?;
                let len = src.get_u32_le() as usize;
                if len == 0 {
                    return Ok(None);
                }
                read_bytes(src, len).map(Some)
            }
            LengthKind::Text => {
                need(src, 1)?;
                let ptr_len = src.get_u8() as usize;
                if ptr_len == 0 {
                    return Ok(None);
                }
                // text pointer and 8-byte timestamp precede the data length
                need(src, ptr_len + 8 + 4)?;
                src.advance(ptr_len + 8);
                let len = src.get_u32_le() as usize;
                read_bytes(src, len).map(Some)
            }
        }
    }

    /// Write one value in this format to row or parameter data.
    ///
    /// `None` writes NULL, which fixed-length types cannot express.
    pub fn encode_value(
        &self,
        value: Option<&[u8]>,
        dst: &mut impl BufMut,
    ) -> Result<(), ProtocolError> {
        match (self.data_type.length_kind(), value) {
            (LengthKind::Fixed(n), Some(bytes)) if bytes.len() == n => dst.put_slice(bytes),
            (LengthKind::Fixed(n), other) => {
                return Err(ProtocolError::LengthMismatch {
                    package: "fixed-length value",
                    declared: n,
                    actual: other.map_or(0, <[u8]>::len),
                });
            }
            (LengthKind::Byte | LengthKind::Decimal, None) => dst.put_u8(0),
            (LengthKind::Byte | LengthKind::Decimal, Some(bytes)) => {
                let len = u8::try_from(bytes.len()).map_err(|_| ProtocolError::FieldTooLong {
                    field: "value",
                    len: bytes.len(),
                    max: u8::MAX as usize,
                })?;
                dst.put_u8(len);
                dst.put_slice(bytes);
            }
            (LengthKind::Long, None) => dst.put_u32_le(0),
            (LengthKind::Long, Some(bytes)) => {
                let len = u32::try_from(bytes.len()).map_err(|_| ProtocolError::FieldTooLong {
                    field: "value",
                    len: bytes.len(),
                    max: u32::MAX as usize,
                })?;
                dst.put_u32_le(len);
                dst.put_slice(bytes);
            }
            (LengthKind::Text, None) => dst.put_u8(0),
            (LengthKind::Text, Some(bytes)) => {
                let len = u32::try_from(bytes.len()).map_err(|_| ProtocolError::FieldTooLong {
                    field: "value",
                    len: bytes.len(),
                    max: u32::MAX as usize,
                })?;
                dst.put_u8(16);
                dst.put_slice(&[0u8; 16]);
                dst.put_slice(&[0u8; 8]);
                dst.put_u32_le(len);
                dst.put_slice(bytes);
            }
        }
        Ok(())
    }
}

/// Decode a counted list of formats as found in row and parameter formats.
pub(crate) fn decode_formats(src: &mut impl Buf) -> Result<Vec<DataFormat>, ProtocolError> {
    need(src, 2)?;
    let count = src.get_u16_le() as usize;
    let mut formats = Vec::with_capacity(count);
    for _ in 0..count {
        formats.push(DataFormat::decode(src)?);
    }
    Ok(formats)
}

/// Encode a counted list of formats.
pub(crate) fn encode_formats(
    formats: &[DataFormat],
    dst: &mut impl BufMut,
) -> Result<(), ProtocolError> {
    let count = u16::try_from(formats.len()).map_err(|_| ProtocolError::FieldTooLong {
        field: "format count",
        len: formats.len(),
        max: u16::MAX as usize,
    })?;
    dst.put_u16_le(count);
    for format in formats {
        format.encode(dst)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_data_type_from_u8() {
        assert_eq!(DataType::from_u8(0x38).unwrap(), DataType::Int4);
        assert_eq!(DataType::from_u8(0x27).unwrap(), DataType::VarChar);
        assert_eq!(
            DataType::from_u8(0x01),
            Err(ProtocolError::UnknownDataType(0x01))
        );
    }

    #[test]
    fn test_int4_format_layout() {
        let format = DataFormat::new(DataType::Int4).with_name("id");
        let mut buf = BytesMut::new();
        format.encode(&mut buf).unwrap();

        // name, status, user type, type, locale
        assert_eq!(
            &buf[..],
            &[2, b'i', b'd', 0, 0, 0, 0, 0, 0x38, 0]
        );

        let decoded = DataFormat::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, format);
    }

    #[test]
    fn test_decimal_format_carries_precision() {
        let mut format = DataFormat::new(DataType::NumN).with_max_length(17);
        format.precision = 38;
        format.scale = 4;

        let mut buf = BytesMut::new();
        format.encode(&mut buf).unwrap();
        let decoded = DataFormat::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.precision, 38);
        assert_eq!(decoded.scale, 4);
        assert_eq!(decoded.max_length, 17);
    }

    #[test]
    fn test_varchar_value_null_and_present() {
        let format = DataFormat::new(DataType::VarChar).with_max_length(255);
        let mut buf = BytesMut::new();
        format.encode_value(Some(b"abc"), &mut buf).unwrap();
        format.encode_value(None, &mut buf).unwrap();

        let mut cursor = buf.freeze();
        assert_eq!(
            format.decode_value(&mut cursor).unwrap().as_deref(),
            Some(&b"abc"[..])
        );
        assert_eq!(format.decode_value(&mut cursor).unwrap(), None);
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_fixed_value_rejects_null() {
        let format = DataFormat::new(DataType::Int4);
        let mut buf = BytesMut::new();
        assert!(format.encode_value(None, &mut buf).is_err());
    }

    #[test]
    fn test_text_value_skips_text_pointer() {
        let format = DataFormat::new(DataType::Text);
        let mut buf = BytesMut::new();
        format.encode_value(Some(b"long text"), &mut buf).unwrap();

        let value = format.decode_value(&mut buf.freeze()).unwrap().unwrap();
        assert_eq!(&value[..], b"long text");
    }
}
