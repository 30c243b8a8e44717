//! # ase-client
//!
//! Async SAP ASE client engine.
//!
//! This crate runs commands over an established, logged-in TDS 5.0
//! transport. It reads the server's package stream, routes out-of-band
//! notifications to hooks and assembles the reply of each command.
//!
//! ## Features
//!
//! - **Generic exec**: one entry point for language commands and
//!   parameterized statements
//! - **Prepared statements**: dynamic statements cached per connection with
//!   LRU eviction
//! - **Streaming results**: a cursor over rows and multiple result sets
//! - **Hooks**: callbacks for environment changes and server messages
//! - **Cancellation**: every blocking call takes a `CancellationToken`
//!
//! ## Architecture
//!
//! ```text
//! Conn::exec → Dispatcher::next_until → Channel → frames → transport
//!                     │
//!                     └── HookRegistry (env changes, EED messages)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ase_client::{Config, Conn, HookRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut conn = Conn::new(stream, Config::default(), HookRegistry::empty());
//! let cancel = CancellationToken::new();
//!
//! let outcome = conn.exec(&cancel, "update t set a = ? where id = ?", &[&1i32, &42i32]).await?;
//! println!("{} row(s) updated", outcome.result.rows_affected());
//!
//! if let Some(mut rows) = conn.exec(&cancel, "select name from t", &[]).await?.rows {
//!     while let Some(row) = rows.next_row(&cancel).await? {
//!         let name: String = rows.get(&row, 0)?;
//!         println!("{name}");
//!     }
//! }
//! ```
//!
//! ## Errors and connection state
//!
//! Every [`Error`] has an [`ErrorKind`]. Transport and protocol errors poison
//! the connection; later calls fail with [`Error::ConnectionPoisoned`].
//! Application errors (non-zero return status, server errors) and validation
//! errors leave it usable.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod conn;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod rows;
pub mod state;
pub mod statement;

pub use config::Config;
pub use conn::{Conn, ExecOutcome, ExecResult};
pub use dispatch::{Dispatched, Dispatcher, Retain, Step};
pub use error::{Error, ErrorKind, Result};
pub use hooks::{HookRegistry, HookRegistryBuilder};
pub use rows::Rows;
pub use state::ProtocolState;
pub use statement::{StatementCache, Stmt};

pub use ase_types::{FromSql, SqlValue, ToSql};
pub use tokio_util::sync::CancellationToken;
