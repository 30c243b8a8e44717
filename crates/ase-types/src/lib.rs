//! # ase-types
//!
//! SAP ASE to Rust type mappings.
//!
//! This crate converts bound arguments into wire parameters and raw row
//! values back into Rust values. It covers the scalar types a parameter can be
//! bound as; date, time, money and decimal columns are left as raw bytes.
//!
//! ## Type Mappings
//!
//! | ASE Type | Rust Type | Parameter format |
//! |----------|-----------|------------------|
//! | `BIT` | `bool` | `BIT` |
//! | `TINYINT` | `u8` | `INTN(1)` |
//! | `SMALLINT` | `i16` | `INTN(2)` |
//! | `INT` | `i32` | `INTN(4)` |
//! | `BIGINT` | `i64` | `INTN(8)` |
//! | `REAL` | `f32` | `FLTN(4)` |
//! | `FLOAT` | `f64` | `FLTN(8)` |
//! | `CHAR`/`VARCHAR`/`TEXT` | `String` | `VARCHAR` or `LONGCHAR` |
//! | `BINARY`/`VARBINARY`/`IMAGE` | `Vec<u8>`, `Bytes` | `VARBINARY` or `LONGBINARY` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decode;
pub mod encode;
pub mod error;
pub mod from_sql;
pub mod to_sql;
pub mod value;

pub use decode::decode_value;
pub use encode::{encode_param, encode_params};
pub use error::TypeError;
pub use from_sql::FromSql;
pub use to_sql::ToSql;
pub use value::SqlValue;
