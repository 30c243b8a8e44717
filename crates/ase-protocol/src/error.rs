//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while encoding or decoding TDS 5.0 wire structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A fixed-size buffer did not have the required length.
    #[error("buffer has unexpected length: expected {expected} bytes, got {actual}")]
    BufferLength {
        /// Required length.
        expected: usize,
        /// Length of the buffer passed in.
        actual: usize,
    },

    /// Not enough bytes were available to decode a package.
    #[error("incomplete package {package}: need {expected} bytes, have {actual}")]
    IncompletePackage {
        /// Package being decoded.
        package: &'static str,
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// The input ended in the middle of a field.
    #[error("unexpected end of package data")]
    UnexpectedEof,

    /// A package type byte that the package model does not know.
    #[error("unknown package type 0x{0:02X}")]
    UnknownPackageType(u8),

    /// A data type byte that the format model does not know.
    #[error("unknown data type 0x{0:02X}")]
    UnknownDataType(u8),

    /// An environment change type byte that is not defined.
    #[error("unknown environment change type {0}")]
    UnknownEnvChangeType(u8),

    /// A dynamic statement operation byte that is not defined.
    #[error("unknown dynamic operation 0x{0:02X}")]
    UnknownDynamicOperation(u8),

    /// A row or params package arrived without a preceding format.
    #[error("{0} package without preceding format")]
    MissingFormat(&'static str),

    /// A string field is longer than its length prefix allows.
    #[error("{field} is too long: {len} bytes, at most {max}")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Actual length.
        len: usize,
        /// Maximum encodable length.
        max: usize,
    },

    /// A package's declared length disagrees with its contents.
    #[error("package {package} declares {declared} bytes but contains {actual}")]
    LengthMismatch {
        /// Package being decoded.
        package: &'static str,
        /// Length written in the package.
        declared: usize,
        /// Bytes actually consumed.
        actual: usize,
    },
}
