//! Cursor over the result sets of a reply.
//!
//! A [`Rows`] is returned by an exec call whose reply opened a result set. It
//! borrows the connection until it is finished or dropped; a dropped cursor
//! leaves the rest of the reply unread and the next command drains it first.
//!
//! Server errors of a reply are reported when its terminal done is read. If
//! the cursor is dropped before that, they are only logged at `warn` level
//! while the next command drains the reply.

use ase_protocol::{DataFormat, Package, Row, RowFmt};
use ase_types::{FromSql, decode_value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::conn::{Conn, ExecResult, done_step, unexpected};
use crate::dispatch::{Dispatched, Retain, Step};
use crate::error::{Error, Result};
use crate::state::ProtocolState;

/// Streaming cursor over rows.
pub struct Rows<'c, T>
where
    T: AsyncRead + AsyncWrite,
{
    conn: &'c mut Conn<T>,
    format: RowFmt,
    next_format: Option<RowFmt>,
    rows_affected: u64,
    finished: bool,
}

impl<'c, T> Rows<'c, T>
where
    T: AsyncRead + AsyncWrite,
{
    pub(crate) fn new(conn: &'c mut Conn<T>, format: RowFmt) -> Self {
        Self {
            conn,
            format,
            next_format: None,
            rows_affected: 0,
            finished: false,
        }
    }

    /// Row format of the current result set.
    #[must_use]
    pub fn format(&self) -> &RowFmt {
        &self.format
    }

    /// Column formats of the current result set.
    #[must_use]
    pub fn columns(&self) -> &[DataFormat] {
        &self.format.formats
    }

    /// Check if the terminal done package has been read.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Affected row count, once the reply is finished.
    #[must_use]
    pub fn rows_affected(&self) -> Option<u64> {
        self.finished.then_some(self.rows_affected)
    }

    /// Decode column `index` of `row` into a Rust value.
    pub fn get<V: FromSql>(&self, row: &Row, index: usize) -> Result<V> {
        let format = self.format.formats.get(index).ok_or_else(|| {
            Error::Validation(format!(
                "column index {index} out of range for {} column(s)",
                self.format.column_count()
            ))
        })?;
        let value = decode_value(format, row.get(index))?;
        Ok(V::from_sql(&value)?)
    }
}

impl<T> Rows<'_, T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the next row of the current result set.
    ///
    /// Returns `None` at the end of the result set; call
    /// [`next_result_set`](Self::next_result_set) to move on.
    pub async fn next_row(&mut self, cancel: &CancellationToken) -> Result<Option<Row>> {
        if self.finished || self.next_format.is_some() {
            return Ok(None);
        }
        if self.conn.is_poisoned() {
            self.finished = true;
            return Err(Error::ConnectionPoisoned);
        }

        let mut rows_affected = 0u64;
        let result = self
            .conn
            .dispatcher
            .next_until(cancel, Retain::Last, |package| match package {
                Package::Row(_) | Package::RowFmt(_) => Ok(Step::Stop),
                Package::Done(done) => done_step(done, &mut rows_affected),
                Package::ReturnStatus(0) => Ok(Step::Continue),
                Package::ReturnStatus(status) => Err(Error::ReturnStatus(*status)),
                Package::Language(_)
                | Package::Dynamic(_)
                | Package::ParamFmt(_)
                | Package::Params(_)
                | Package::EnvChange(_)
                | Package::Eed(_) => Err(unexpected(package)),
            })
            .await;
        self.rows_affected += rows_affected;

        let dispatched = match result {
            Ok(dispatched) => dispatched,
            Err(e) => {
                self.finished = true;
                return self.conn.finish(Err(e));
            }
        };

        match dispatched {
            Dispatched::Delivered(Package::Row(row)) => Ok(Some(row)),
            Dispatched::Delivered(Package::RowFmt(format)) => {
                tracing::debug!(columns = format.column_count(), "next result set");
                self.next_format = Some(format);
                Ok(None)
            }
            Dispatched::Delivered(Package::Done(_)) => {
                self.finished = true;
                if let Err(e) = self.conn.check_reply_end() {
                    return Err(self.fail(e));
                }
                self.conn.state = ProtocolState::Ready;
                self.conn.check_server_errors()?;
                Ok(None)
            }
            Dispatched::Delivered(other) => Err(self.fail(unexpected(&other))),
            Dispatched::Empty => Err(self.fail(Error::ProtocolViolation(
                "cursor stopped without a package".into(),
            ))),
        }
    }

    /// Skip to the next result set.
    ///
    /// Unread rows of the current set are discarded. Returns `false` once the
    /// reply is finished.
    pub async fn next_result_set(&mut self, cancel: &CancellationToken) -> Result<bool> {
        while self.next_row(cancel).await?.is_some() {}
        match self.next_format.take() {
            Some(format) => {
                self.format = format;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Read the rest of the reply and report the affected row count.
    pub async fn close(mut self, cancel: &CancellationToken) -> Result<ExecResult> {
        while self.next_result_set(cancel).await? {}
        Ok(ExecResult::new(self.rows_affected))
    }

    fn fail(&mut self, err: Error) -> Error {
        self.finished = true;
        self.conn.poison(&err);
        err
    }
}

impl<T> std::fmt::Debug for Rows<'_, T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("columns", &self.format.column_count())
            .field("rows_affected", &self.rows_affected)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
