//! Raw value decoding.
//!
//! Turns the raw bytes of a row or parameter value into a [`SqlValue`]
//! according to its [`DataFormat`]. Integers and floats are little-endian;
//! character data is decoded as lossy UTF-8.

use ase_protocol::format::{DataFormat, DataType};

use crate::error::TypeError;
use crate::value::SqlValue;

/// Decode a raw value. `None` is NULL.
pub fn decode_value(format: &DataFormat, raw: Option<&[u8]>) -> Result<SqlValue, TypeError> {
    let Some(raw) = raw else {
        return Ok(SqlValue::Null);
    };

    match format.data_type {
        DataType::Bit => match raw {
            [b] => Ok(SqlValue::Bool(*b != 0)),
            _ => Err(invalid_length("BIT", raw)),
        },
        DataType::Int1 | DataType::Int2 | DataType::Int4 | DataType::Int8 | DataType::IntN => {
            decode_signed(raw)
        }
        DataType::Uint2 | DataType::Uint4 | DataType::Uint8 | DataType::UintN => {
            decode_unsigned(raw)
        }
        DataType::Flt4 | DataType::Flt8 | DataType::FltN => decode_float(raw),
        DataType::Char | DataType::VarChar | DataType::LongChar | DataType::Text => {
            Ok(SqlValue::String(String::from_utf8_lossy(raw).into_owned()))
        }
        DataType::Binary | DataType::VarBinary | DataType::LongBinary | DataType::Image => {
            Ok(SqlValue::Binary(bytes::Bytes::copy_from_slice(raw)))
        }
        other => Err(TypeError::UnsupportedConversion {
            from: format!("{other:?}"),
            to: "SqlValue",
        }),
    }
}

fn invalid_length(data_type: &'static str, raw: &[u8]) -> TypeError {
    TypeError::InvalidLength {
        data_type,
        len: raw.len(),
    }
}

fn decode_signed(raw: &[u8]) -> Result<SqlValue, TypeError> {
    match *raw {
        [b] => Ok(SqlValue::TinyInt(b)),
        [a, b] => Ok(SqlValue::SmallInt(i16::from_le_bytes([a, b]))),
        [a, b, c, d] => Ok(SqlValue::Int(i32::from_le_bytes([a, b, c, d]))),
        [a, b, c, d, e, f, g, h] => Ok(SqlValue::BigInt(i64::from_le_bytes([
            a, b, c, d, e, f, g, h,
        ]))),
        _ => Err(invalid_length("INT", raw)),
    }
}

fn decode_unsigned(raw: &[u8]) -> Result<SqlValue, TypeError> {
    match *raw {
        [b] => Ok(SqlValue::TinyInt(b)),
        [a, b] => Ok(SqlValue::Int(i32::from(u16::from_le_bytes([a, b])))),
        [a, b, c, d] => Ok(SqlValue::BigInt(i64::from(u32::from_le_bytes([
            a, b, c, d,
        ])))),
        [a, b, c, d, e, f, g, h] => {
            let v = u64::from_le_bytes([a, b, c, d, e, f, g, h]);
            i64::try_from(v)
                .map(SqlValue::BigInt)
                .map_err(|_| TypeError::OutOfRange {
                    target_type: "BIGINT",
                })
        }
        _ => Err(invalid_length("UNSIGNED INT", raw)),
    }
}

fn decode_float(raw: &[u8]) -> Result<SqlValue, TypeError> {
    match *raw {
        [a, b, c, d] => Ok(SqlValue::Float(f32::from_le_bytes([a, b, c, d]))),
        [a, b, c, d, e, f, g, h] => Ok(SqlValue::Double(f64::from_le_bytes([
            a, b, c, d, e, f, g, h,
        ]))),
        _ => Err(invalid_length("FLOAT", raw)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_null() {
        let format = DataFormat::new(DataType::IntN).with_max_length(4);
        assert_eq!(decode_value(&format, None).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_decode_intn_by_length() {
        let format = DataFormat::new(DataType::IntN).with_max_length(8);
        assert_eq!(
            decode_value(&format, Some(&[0x2A, 0, 0, 0])).unwrap(),
            SqlValue::Int(42)
        );
        assert_eq!(
            decode_value(&format, Some(&(-1i64).to_le_bytes())).unwrap(),
            SqlValue::BigInt(-1)
        );
        assert!(matches!(
            decode_value(&format, Some(&[1, 2, 3])),
            Err(TypeError::InvalidLength { len: 3, .. })
        ));
    }

    #[test]
    fn test_decode_uint8_out_of_range() {
        let format = DataFormat::new(DataType::Uint8);
        assert!(matches!(
            decode_value(&format, Some(&u64::MAX.to_le_bytes())),
            Err(TypeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_decode_varchar() {
        let format = DataFormat::new(DataType::VarChar).with_max_length(30);
        assert_eq!(
            decode_value(&format, Some(b"tempdb")).unwrap(),
            SqlValue::String("tempdb".into())
        );
    }

    #[test]
    fn test_decode_unsupported() {
        let format = DataFormat::new(DataType::DateTime);
        assert!(matches!(
            decode_value(&format, Some(&[0; 8])),
            Err(TypeError::UnsupportedConversion { .. })
        ));
    }
}
