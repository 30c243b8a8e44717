//! Connection and the generic exec engine.
//!
//! Every command goes through [`Conn::exec`]:
//!
//! - without arguments the query is sent as a language command;
//! - with arguments it is prepared once as a dynamic statement and executed
//!   with a parameter format and the parameter values.
//!
//! The reply is then read until it either opens a result set, in which case
//! a [`Rows`] cursor is returned, or ends with a terminal done package.

use std::sync::Arc;

use ase_codec::Channel;
use ase_protocol::{Done, Dynamic, DynamicOp, Language, Package, PacketType, ParamFmt, Params, RowFmt};
use ase_types::{SqlValue, ToSql, encode_params};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::{Dispatched, Dispatcher, Retain, Step};
use crate::error::{Error, Result};
use crate::hooks::HookRegistry;
use crate::rows::Rows;
use crate::state::ProtocolState;
use crate::statement::{StatementCache, Stmt};

/// Summary of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    rows_affected: u64,
}

impl ExecResult {
    /// Create a result.
    #[must_use]
    pub fn new(rows_affected: u64) -> Self {
        Self { rows_affected }
    }

    /// Sum of the counts of every done package carrying one.
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }
}

/// What an exec call produced.
///
/// `rows` is set when the reply opened a result set; `result` then stays
/// zero and the cursor reports the final count.
#[derive(Debug)]
pub struct ExecOutcome<'c, T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Cursor over the result set, if the reply has one.
    pub rows: Option<Rows<'c, T>>,
    /// Result of a reply without a result set.
    pub result: ExecResult,
}

impl<T> ExecOutcome<'_, T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Check if a result set is open.
    #[must_use]
    pub fn has_rows(&self) -> bool {
        self.rows.is_some()
    }
}

/// How the result-assembly loop ended.
enum Reply {
    Rows(RowFmt),
    Done(ExecResult),
}

/// A connection to the server, already logged in.
pub struct Conn<T>
where
    T: AsyncRead + AsyncWrite,
{
    pub(crate) dispatcher: Dispatcher<T>,
    config: Config,
    statements: StatementCache,
    pub(crate) state: ProtocolState,
}

impl<T> Conn<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Wrap an established transport.
    pub fn new(transport: T, config: Config, hooks: Arc<HookRegistry>) -> Self {
        let channel = Channel::new(transport, config.channel_options());
        Self {
            dispatcher: Dispatcher::new(channel, hooks),
            statements: StatementCache::new(config.statement_cache_size),
            config,
            state: ProtocolState::Ready,
        }
    }

    /// The configuration this connection was created with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Check if a transport or protocol failure made the connection unusable.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        !self.state.is_usable()
    }

    /// Prepared statements of this connection.
    #[must_use]
    pub fn statements(&self) -> &StatementCache {
        &self.statements
    }

    /// The underlying channel.
    #[must_use]
    pub fn channel(&self) -> &Channel<T> {
        self.dispatcher.channel()
    }

    /// Mark the connection unusable.
    pub(crate) fn poison(&mut self, err: &Error) {
        if self.state != ProtocolState::Poisoned {
            tracing::warn!(error = %err, "connection poisoned");
        }
        self.state = ProtocolState::Poisoned;
        self.dispatcher.invalidate();
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state.is_usable() {
            Ok(())
        } else {
            Err(Error::ConnectionPoisoned)
        }
    }
}

impl<T> Conn<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Execute `query`.
    ///
    /// Arguments are converted before anything is sent; a failing argument
    /// returns a validation error and leaves the connection untouched.
    ///
    /// The argument count is the exception: it is checked against the
    /// parameter formats the server returns when the statement is prepared.
    /// A mismatch is still a validation error and the connection stays
    /// usable, but the prepare (and the deallocation of an evicted
    /// statement) has already gone over the wire.
    pub async fn exec(
        &mut self,
        cancel: &CancellationToken,
        query: &str,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<ExecOutcome<'_, T>> {
        let reply = match self.config.command_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(cancel, query, args))
                .await
                .unwrap_or(Err(Error::CommandTimeout)),
            None => self.run(cancel, query, args).await,
        };

        match reply {
            Ok(Reply::Rows(format)) => {
                self.state = ProtocolState::Streaming;
                Ok(ExecOutcome {
                    rows: Some(Rows::new(self, format)),
                    result: ExecResult::default(),
                })
            }
            Ok(Reply::Done(result)) => Ok(ExecOutcome { rows: None, result }),
            Err(e) => {
                if e.poisons_connection() {
                    self.poison(&e);
                }
                Err(e)
            }
        }
    }

    /// Execute `query` directly; the same as [`exec`](Self::exec).
    pub async fn direct_exec(
        &mut self,
        cancel: &CancellationToken,
        query: &str,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<ExecOutcome<'_, T>> {
        self.exec(cancel, query, args).await
    }

    /// Execute `query` and discard any result set.
    pub async fn execute(
        &mut self,
        cancel: &CancellationToken,
        query: &str,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<ExecResult> {
        let outcome = self.exec(cancel, query, args).await?;
        match outcome.rows {
            Some(rows) => rows.close(cancel).await,
            None => Ok(outcome.result),
        }
    }

    /// Deallocate every prepared statement on the server.
    pub async fn clear_statements(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.ensure_usable()?;
        let result = async {
            self.settle(cancel).await?;
            for stmt in self.statements.clear() {
                self.deallocate(cancel, &stmt).await?;
            }
            Ok::<(), Error>(())
        }
        .await;
        self.finish(result)
    }

    async fn run(
        &mut self,
        cancel: &CancellationToken,
        query: &str,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<Reply> {
        self.ensure_usable()?;
        let values = convert_args(args)?;
        let params = if values.is_empty() {
            None
        } else {
            Some(encode_params(&values)?)
        };
        let result = self.send_and_read(cancel, query, params).await;
        self.finish(result)
    }

    async fn send_and_read(
        &mut self,
        cancel: &CancellationToken,
        query: &str,
        params: Option<(ParamFmt, Params)>,
    ) -> Result<Reply> {
        self.settle(cancel).await?;

        match params {
            None => {
                tracing::debug!(query, "sending language command");
                let payload = Package::encode_all([&Package::Language(Language::new(query))])?;
                self.dispatcher
                    .send(PacketType::Language, payload, cancel)
                    .await?;
            }
            Some((param_fmt, params)) => {
                let stmt = self.statement(cancel, query).await?;
                stmt.check_arity(params.values.len())?;

                tracing::debug!(
                    id = stmt.id(),
                    args = params.values.len(),
                    "executing dynamic statement"
                );
                let packages = [
                    Package::Dynamic(Dynamic::exec(stmt.id())),
                    Package::ParamFmt(param_fmt),
                    Package::Params(params),
                ];
                let payload = Package::encode_all(&packages)?;
                self.dispatcher
                    .send(PacketType::Normal, payload, cancel)
                    .await?;
            }
        }

        self.read_reply(cancel).await
    }

    /// Result-assembly loop.
    async fn read_reply(&mut self, cancel: &CancellationToken) -> Result<Reply> {
        let mut rows_affected = 0u64;
        let dispatched = self
            .dispatcher
            .next_until(cancel, Retain::Last, |package| match package {
                Package::RowFmt(_) => Ok(Step::Stop),
                Package::Done(done) => done_step(done, &mut rows_affected),
                Package::ReturnStatus(0) => Ok(Step::Continue),
                Package::ReturnStatus(status) => Err(Error::ReturnStatus(*status)),
                Package::Row(_)
                | Package::Language(_)
                | Package::Dynamic(_)
                | Package::ParamFmt(_)
                | Package::Params(_)
                | Package::EnvChange(_)
                | Package::Eed(_) => Err(unexpected(package)),
            })
            .await?;

        match dispatched {
            Dispatched::Delivered(Package::RowFmt(format)) => {
                tracing::debug!(columns = format.column_count(), "result set opened");
                Ok(Reply::Rows(format))
            }
            Dispatched::Delivered(Package::Done(_)) => {
                self.check_reply_end()?;
                self.check_server_errors()?;
                Ok(Reply::Done(ExecResult::new(rows_affected)))
            }
            Dispatched::Delivered(other) => Err(unexpected(&other)),
            Dispatched::Empty => Err(Error::ProtocolViolation(
                "result loop stopped without a package".into(),
            )),
        }
    }

    /// Look up or prepare the statement for `query`.
    async fn statement(&mut self, cancel: &CancellationToken, query: &str) -> Result<Stmt> {
        if let Some(stmt) = self.statements.get(query) {
            return Ok(stmt);
        }
        if let Some(evicted) = self.statements.make_room() {
            self.deallocate(cancel, &evicted).await?;
        }
        let stmt = self.prepare(cancel, query).await?;
        self.statements.insert(stmt.clone());
        Ok(stmt)
    }

    async fn prepare(&mut self, cancel: &CancellationToken, query: &str) -> Result<Stmt> {
        let id = self.statements.next_id();
        let payload = Package::encode_all([&Package::Dynamic(Dynamic::prepare(&id, query))])?;
        self.dispatcher
            .send(PacketType::Normal, payload, cancel)
            .await?;

        let mut acked = false;
        let mut param_formats = None;
        self.dispatcher
            .next_until(cancel, Retain::Nothing, |package| match package {
                Package::Dynamic(dynamic) if dynamic.op == DynamicOp::Ack => {
                    if dynamic.id != id {
                        return Err(Error::ProtocolViolation(format!(
                            "acknowledgement for statement {} while preparing {id}",
                            dynamic.id
                        )));
                    }
                    acked = true;
                    Ok(Step::Continue)
                }
                Package::ParamFmt(fmt) => {
                    param_formats = Some(fmt.formats.clone());
                    Ok(Step::Continue)
                }
                Package::RowFmt(_) => Ok(Step::Continue),
                Package::Done(done) => done_step(done, &mut 0),
                Package::Dynamic(_)
                | Package::Row(_)
                | Package::ReturnStatus(_)
                | Package::Language(_)
                | Package::Params(_)
                | Package::EnvChange(_)
                | Package::Eed(_) => Err(unexpected(package)),
            })
            .await?;

        self.check_reply_end()?;
        self.check_server_errors()?;
        if !acked {
            return Err(Error::ProtocolViolation(format!(
                "prepare of {id} was not acknowledged"
            )));
        }

        tracing::debug!(
            id = %id,
            query,
            params = ?param_formats.as_ref().map(Vec::len),
            "prepared statement"
        );
        Ok(Stmt::new(id, query, param_formats))
    }

    async fn deallocate(&mut self, cancel: &CancellationToken, stmt: &Stmt) -> Result<()> {
        let payload = Package::encode_all([&Package::Dynamic(Dynamic::dealloc(stmt.id()))])?;
        self.dispatcher
            .send(PacketType::Normal, payload, cancel)
            .await?;

        self.dispatcher
            .next_until(cancel, Retain::Nothing, |package| match package {
                Package::Dynamic(_) => Ok(Step::Continue),
                Package::Done(done) => done_step(done, &mut 0),
                Package::RowFmt(_)
                | Package::Row(_)
                | Package::ReturnStatus(_)
                | Package::Language(_)
                | Package::ParamFmt(_)
                | Package::Params(_)
                | Package::EnvChange(_)
                | Package::Eed(_) => Err(unexpected(package)),
            })
            .await?;

        self.check_reply_end()?;
        self.check_server_errors()?;
        tracing::debug!(id = stmt.id(), "deallocated statement");
        Ok(())
    }

    /// Read and discard the rest of the current reply.
    async fn drain(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.dispatcher
            .next_until(cancel, Retain::Nothing, |package| match package {
                Package::Done(done) => done_step(done, &mut 0),
                _ => Ok(Step::Continue),
            })
            .await?;
        self.check_reply_end()?;
        self.discard_server_errors();
        self.state = ProtocolState::Ready;
        Ok(())
    }

    /// Finish a reply left open by a dropped cursor or a failed return status.
    async fn settle(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.state == ProtocolState::Streaming {
            tracing::debug!("draining unread result set");
            self.drain(cancel).await?;
        }
        self.discard_server_errors();
        Ok(())
    }

    /// Drop server errors nobody will see, logging each one.
    fn discard_server_errors(&mut self) {
        for eed in self.dispatcher.take_server_errors() {
            tracing::warn!(
                number = eed.number,
                severity = eed.severity,
                message = %eed.message,
                "discarding server error from an unread reply"
            );
        }
    }

    /// Leave the connection consistent after `result`.
    ///
    /// A non-zero return status aborts before the terminal done; the rest of
    /// that reply is drained by the next command. Transport and protocol
    /// errors poison.
    pub(crate) fn finish<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(err) = &result {
            if err.poisons_connection() {
                self.poison(err);
            } else if matches!(err, Error::ReturnStatus(_)) {
                self.state = ProtocolState::Streaming;
            }
        }
        result
    }

    /// A terminal done must be the last package of its reply.
    pub(crate) fn check_reply_end(&self) -> Result<()> {
        if self.dispatcher.has_buffered() {
            Err(Error::ProtocolViolation("data after terminal done".into()))
        } else {
            Ok(())
        }
    }

    /// Turn the first pending error EED into an error.
    pub(crate) fn check_server_errors(&mut self) -> Result<()> {
        let mut errors = self.dispatcher.take_server_errors().into_iter();
        match errors.next() {
            Some(first) => {
                for other in errors {
                    tracing::debug!(number = other.number, message = %other.message, "additional server error");
                }
                Err(Error::from(&first))
            }
            None => Ok(()),
        }
    }
}

impl<T> std::fmt::Debug for Conn<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("statements", &self.statements)
            .finish_non_exhaustive()
    }
}

/// Convert every argument before anything is sent.
fn convert_args(args: &[&(dyn ToSql + Sync)]) -> Result<Vec<SqlValue>> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| {
            arg.to_sql().map_err(|e| {
                Error::Validation(format!("argument {} ({}): {e}", i + 1, arg.sql_type()))
            })
        })
        .collect()
}

/// Done handling shared by every reply loop.
///
/// `MORE` wins over `PROC` and `FINAL`: a done announcing more results never
/// ends the loop.
pub(crate) fn done_step(done: &Done, rows_affected: &mut u64) -> Result<Step> {
    if done.status.is_count() {
        *rows_affected += u64::try_from(done.count).unwrap_or_default();
    }
    if done.status.is_more() {
        Ok(Step::Continue)
    } else if done.status.is_proc() || done.status.is_final() {
        Ok(Step::Stop)
    } else {
        Err(Error::ProtocolViolation(
            "done package missing terminal status".into(),
        ))
    }
}

pub(crate) fn unexpected(package: &Package) -> Error {
    Error::ProtocolViolation(format!("unexpected package {}", package.package_type()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ase_protocol::DoneStatus;

    #[test]
    fn test_done_step_counts_and_stops() {
        let mut affected = 0;
        let more = Done::new(DoneStatus::MORE | DoneStatus::COUNT, 2);
        assert_eq!(done_step(&more, &mut affected).unwrap(), Step::Continue);
        let last = Done::new(DoneStatus::FINAL | DoneStatus::COUNT, 3);
        assert_eq!(done_step(&last, &mut affected).unwrap(), Step::Stop);
        assert_eq!(affected, 5);
    }

    #[test]
    fn test_done_step_more_wins_over_final() {
        let mut affected = 0;
        let done = Done::new(DoneStatus::MORE | DoneStatus::FINAL, 0);
        assert_eq!(done_step(&done, &mut affected).unwrap(), Step::Continue);
    }

    #[test]
    fn test_done_step_count_ignored_without_flag() {
        let mut affected = 0;
        let done = Done::new(DoneStatus::PROC, 9);
        assert_eq!(done_step(&done, &mut affected).unwrap(), Step::Stop);
        assert_eq!(affected, 0);
    }

    #[test]
    fn test_done_step_without_terminal_status() {
        let mut affected = 0;
        let err = done_step(&Done::new(DoneStatus::empty(), 0), &mut affected).unwrap_err();
        assert_eq!(
            err.to_string(),
            "protocol violation: done package missing terminal status"
        );
    }

    #[test]
    fn test_convert_args_reports_position() {
        let too_big = u64::MAX;
        let ok = 1i32;
        let err = convert_args(&[&ok, &too_big]).unwrap_err();
        match err {
            Error::Validation(msg) => assert!(msg.starts_with("argument 2"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
