//! Parameter encoding and value decoding through the wire format.
//!
//! Values are encoded as parameters, written and read back with their data
//! format, then decoded again, the way a cursor consumer sees them.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use ase_protocol::format::DataFormat;
use ase_types::{FromSql, SqlValue, ToSql, TypeError, decode_value, encode_param};
use bytes::{Bytes, BytesMut};
use proptest::prelude::*;

fn through_wire(value: &SqlValue) -> SqlValue {
    let (format, raw) = encode_param(value).unwrap();
    let mut buf = BytesMut::new();
    format.encode_value(raw.as_deref(), &mut buf).unwrap();

    let mut cursor = buf.freeze();
    let read = format.decode_value(&mut cursor).unwrap();
    assert!(cursor.is_empty());
    decode_value(&format, read.as_deref()).unwrap()
}

mod null_handling {
    use super::*;

    #[test]
    fn test_null_survives_wire() {
        assert_eq!(through_wire(&SqlValue::Null), SqlValue::Null);
    }

    #[test]
    fn test_null_to_option() {
        let value = through_wire(&None::<i32>.to_sql().unwrap());
        assert_eq!(Option::<i32>::from_sql(&value).unwrap(), None);
        assert_eq!(i32::from_sql(&value), Err(TypeError::UnexpectedNull));
    }
}

mod scalars {
    use super::*;

    #[test]
    fn test_integer_boundaries() {
        for value in [
            SqlValue::TinyInt(u8::MAX),
            SqlValue::SmallInt(i16::MIN),
            SqlValue::Int(i32::MAX),
            SqlValue::BigInt(i64::MIN),
        ] {
            assert_eq!(through_wire(&value), value);
        }
    }

    #[test]
    fn test_bool() {
        assert_eq!(through_wire(&true.to_sql().unwrap()), SqlValue::Bool(true));
        assert_eq!(through_wire(&false.to_sql().unwrap()), SqlValue::Bool(false));
    }

    #[test]
    fn test_float_special_values() {
        let value = through_wire(&SqlValue::Double(f64::INFINITY));
        assert_eq!(value, SqlValue::Double(f64::INFINITY));

        let value = through_wire(&SqlValue::Double(f64::NAN));
        assert!(value.as_f64().unwrap().is_nan());

        assert_eq!(through_wire(&SqlValue::Float(1.5)), SqlValue::Float(1.5));
    }

    #[test]
    fn test_u64_beyond_bigint_is_rejected_before_encoding() {
        assert!(matches!(
            (u64::MAX).to_sql(),
            Err(TypeError::OutOfRange { .. })
        ));
    }
}

mod strings_and_binary {
    use super::*;

    #[test]
    fn test_empty_string_becomes_space() {
        assert_eq!(
            through_wire(&SqlValue::String(String::new())),
            SqlValue::String(" ".into())
        );
    }

    #[test]
    fn test_utf8_string() {
        let value = SqlValue::String("Grüße, 世界".into());
        assert_eq!(through_wire(&value), value);
    }

    #[test]
    fn test_long_string_uses_long_format() {
        let value = SqlValue::String("x".repeat(10_000));
        assert_eq!(through_wire(&value), value);
    }

    #[test]
    fn test_binary_all_byte_values() {
        let value = SqlValue::Binary(Bytes::from((0..=255u8).collect::<Vec<_>>()));
        let decoded = through_wire(&value);
        assert_eq!(Vec::<u8>::from_sql(&decoded).unwrap().len(), 256);
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_empty_binary_becomes_zero_byte() {
        let value = through_wire(&Vec::<u8>::new().to_sql().unwrap());
        assert_eq!(value.as_bytes(), Some(&[0u8][..]));
    }

    #[test]
    fn test_binary_to_string_fails() {
        let value = through_wire(&SqlValue::Binary(Bytes::from_static(b"abc")));
        assert!(matches!(
            String::from_sql(&value),
            Err(TypeError::TypeMismatch { .. })
        ));
    }
}

mod formats {
    use super::*;
    use ase_protocol::format::DataType;

    #[test]
    fn test_fixed_int4_column() {
        let format = DataFormat::new(DataType::Int4);
        let value = decode_value(&format, Some(&7i32.to_le_bytes())).unwrap();
        assert_eq!(i64::from_sql(&value).unwrap(), 7);
    }

    #[test]
    fn test_unsigned_smallint_widens() {
        let format = DataFormat::new(DataType::Uint2);
        let value = decode_value(&format, Some(&u16::MAX.to_le_bytes())).unwrap();
        assert_eq!(value, SqlValue::Int(65535));
    }
}

proptest! {
    #[test]
    fn prop_int_survives_wire(v in any::<i32>()) {
        prop_assert_eq!(through_wire(&SqlValue::Int(v)), SqlValue::Int(v));
    }

    #[test]
    fn prop_non_empty_string_survives_wire(s in "[a-zA-Z0-9 ]{1,600}") {
        let value = SqlValue::String(s);
        prop_assert_eq!(through_wire(&value), value);
    }
}
