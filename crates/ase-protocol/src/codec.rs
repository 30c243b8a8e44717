//! Codec utilities for TDS protocol encoding and decoding.
//!
//! Package bodies use little-endian integers and single-byte character data.
//! Text is carried as raw bytes; decoding is lossy UTF-8.

use bytes::{Buf, BufMut, Bytes};

use crate::error::ProtocolError;

/// Ensure `src` holds at least `n` more bytes.
pub fn need(src: &impl Buf, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(())
}

/// Read a string prefixed with a 1-byte length.
pub fn read_b_string(src: &mut impl Buf) -> Result<String, ProtocolError> {
    need(src, 1)?;
    let len = src.get_u8() as usize;
    read_string(src, len)
}

/// Read a string prefixed with a 2-byte little-endian length.
pub fn read_us_string(src: &mut impl Buf) -> Result<String, ProtocolError> {
    need(src, 2)?;
    let len = src.get_u16_le() as usize;
    read_string(src, len)
}

/// Read a string of `len` bytes.
pub fn read_string(src: &mut impl Buf, len: usize) -> Result<String, ProtocolError> {
    let bytes = read_bytes(src, len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read exactly `len` bytes.
pub fn read_bytes(src: &mut impl Buf, len: usize) -> Result<Bytes, ProtocolError> {
    need(src, len)?;
    Ok(src.copy_to_bytes(len))
}

/// Write a string prefixed with a 1-byte length.
pub fn write_b_string(
    dst: &mut impl BufMut,
    field: &'static str,
    s: &str,
) -> Result<(), ProtocolError> {
    let len = u8::try_from(s.len()).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len: s.len(),
        max: u8::MAX as usize,
    })?;
    dst.put_u8(len);
    dst.put_slice(s.as_bytes());
    Ok(())
}

/// Write a string prefixed with a 2-byte little-endian length.
pub fn write_us_string(
    dst: &mut impl BufMut,
    field: &'static str,
    s: &str,
) -> Result<(), ProtocolError> {
    let len = u16::try_from(s.len()).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len: s.len(),
        max: u16::MAX as usize,
    })?;
    dst.put_u16_le(len);
    dst.put_slice(s.as_bytes());
    Ok(())
}

/// Split off a package body whose length was announced by a prefix.
pub fn take_body(
    src: &mut impl Buf,
    package: &'static str,
    len: usize,
) -> Result<Bytes, ProtocolError> {
    if src.remaining() < len {
        return Err(ProtocolError::IncompletePackage {
            package,
            expected: len,
            actual: src.remaining(),
        });
    }
    Ok(src.copy_to_bytes(len))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_b_string_roundtrip() {
        let mut buf = BytesMut::new();
        write_b_string(&mut buf, "name", "master").unwrap();
        assert_eq!(buf[0], 6);

        let mut cursor = buf.freeze();
        assert_eq!(read_b_string(&mut cursor).unwrap(), "master");
    }

    #[test]
    fn test_us_string_is_little_endian() {
        let mut buf = BytesMut::new();
        write_us_string(&mut buf, "message", "abc").unwrap();
        assert_eq!(&buf[..], &[3, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_b_string_too_long() {
        let mut buf = BytesMut::new();
        let long = "x".repeat(300);
        let err = write_b_string(&mut buf, "id", &long).unwrap_err();
        assert!(matches!(err, ProtocolError::FieldTooLong { field: "id", .. }));
    }

    #[test]
    fn test_read_string_short_input() {
        let mut cursor: &[u8] = &[5, b'a', b'b'];
        assert_eq!(read_b_string(&mut cursor), Err(ProtocolError::UnexpectedEof));
    }
}
