//! Package dispatcher.
//!
//! The dispatcher turns the message stream of a [`Channel`] into a package
//! stream. Out-of-band packages (environment changes and EED messages) are
//! handed to the [`HookRegistry`] and absorbed; everything else is offered to
//! a caller-supplied `decide` function that chooses whether to keep reading.
//!
//! ```text
//! Channel → Message → PackageParser → hooks → decide → Step::{Continue, Stop}
//! ```

use std::sync::Arc;

use ase_codec::Channel;
use ase_protocol::{
    Eed, EnvChange, EnvChangeType, Package, PackageParser, PacketType, RowFmt,
};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::hooks::HookRegistry;

/// What to do with the package `decide` stopped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retain {
    /// Return it as [`Dispatched::Delivered`].
    Last,
    /// Drop it and return [`Dispatched::Empty`].
    Nothing,
}

/// Verdict of a `decide` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Read the next package.
    Continue,
    /// End the loop on this package.
    Stop,
}

/// Result of [`Dispatcher::next_until`].
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// The package the loop stopped on.
    Delivered(Package),
    /// The loop stopped and nothing was retained.
    Empty,
}

impl Dispatched {
    /// The delivered package, if any.
    #[must_use]
    pub fn into_package(self) -> Option<Package> {
        match self {
            Self::Delivered(package) => Some(package),
            Self::Empty => None,
        }
    }
}

/// Reads packages from a channel and routes them.
pub struct Dispatcher<T>
where
    T: AsyncRead + AsyncWrite,
{
    channel: Channel<T>,
    parser: PackageParser,
    hooks: Arc<HookRegistry>,
    server_errors: Vec<Eed>,
}

impl<T> Dispatcher<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a dispatcher over `channel`.
    pub fn new(channel: Channel<T>, hooks: Arc<HookRegistry>) -> Self {
        Self {
            channel,
            parser: PackageParser::default(),
            hooks,
            server_errors: Vec::new(),
        }
    }

    /// The underlying channel.
    #[must_use]
    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    /// The hooks notified of out-of-band packages.
    #[must_use]
    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Row format of the current result set.
    #[must_use]
    pub fn row_format(&self) -> Option<&RowFmt> {
        self.parser.row_format()
    }

    /// Check if decoded but undispatched data is buffered.
    #[must_use]
    pub fn has_buffered(&self) -> bool {
        self.parser.has_remaining()
    }

    /// Drain the error-severity EED messages seen since the last call.
    pub fn take_server_errors(&mut self) -> Vec<Eed> {
        std::mem::take(&mut self.server_errors)
    }

    /// Check if error-severity EED messages are pending.
    #[must_use]
    pub fn has_server_errors(&self) -> bool {
        !self.server_errors.is_empty()
    }

    /// Make the channel unusable and drop buffered data.
    pub fn invalidate(&mut self) {
        self.channel.invalidate();
        self.parser.feed(Bytes::new());
        self.server_errors.clear();
    }

    fn apply_env_change(&mut self, change: &EnvChange) {
        if change.env_type != EnvChangeType::PacketSize {
            return;
        }
        match change.new_value.trim().parse::<usize>() {
            Ok(size) => {
                tracing::debug!(packet_size = size, "server changed packet size");
                self.channel.set_packet_size(size);
            }
            Err(_) => {
                tracing::warn!(value = %change.new_value, "ignoring unparsable packet size");
            }
        }
    }
}

impl<T> Dispatcher<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Send one logical message.
    pub async fn send(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.channel
            .send_message(packet_type, payload, cancel)
            .await
            .map_err(Into::into)
    }

    /// Decode the next package, reading further messages as needed.
    ///
    /// No hooks fire and no package is absorbed.
    pub async fn next_package(&mut self, cancel: &CancellationToken) -> Result<Package> {
        loop {
            if let Some(package) = self.parser.next_package()? {
                return Ok(package);
            }
            let message = self.channel.read_message(cancel).await?;
            tracing::trace!(
                packet_type = ?message.packet_type,
                len = message.len(),
                "feeding message to parser"
            );
            self.parser.feed(message.payload);
        }
    }

    /// Read packages until `decide` stops.
    ///
    /// Every package first passes the hooks. Environment changes and EED
    /// messages end there: they are absorbed and never reach `decide`; EEDs
    /// above the informational severities are recorded for
    /// [`take_server_errors`](Self::take_server_errors). An error from
    /// `decide` ends the loop and is returned as is.
    pub async fn next_until<F>(
        &mut self,
        cancel: &CancellationToken,
        retain: Retain,
        mut decide: F,
    ) -> Result<Dispatched>
    where
        F: FnMut(&Package) -> Result<Step>,
    {
        loop {
            let package = self.next_package(cancel).await?;
            tracing::debug!(package_type = %package.package_type(), "dispatching package");

            match &package {
                Package::EnvChange(env) => {
                    for change in &env.changes {
                        self.apply_env_change(change);
                        self.hooks.fire_env_change(change);
                    }
                    continue;
                }
                Package::Eed(eed) => {
                    self.hooks.fire_eed(eed);
                    if eed.is_error() {
                        self.server_errors.push(eed.clone());
                    } else {
                        tracing::debug!(number = eed.number, message = %eed.message, "server message");
                    }
                    continue;
                }
                _ => {}
            }

            match decide(&package)? {
                Step::Continue => {}
                Step::Stop => {
                    return Ok(match retain {
                        Retain::Last => Dispatched::Delivered(package),
                        Retain::Nothing => Dispatched::Empty,
                    });
                }
            }
        }
    }
}

impl<T> std::fmt::Debug for Dispatcher<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channel", &self.channel)
            .field("buffered", &self.parser.remaining())
            .field("hooks", &self.hooks)
            .field("server_errors", &self.server_errors.len())
            .finish()
    }
}
