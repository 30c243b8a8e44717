//! Connection configuration.

use std::time::Duration;

use ase_codec::{ChannelOptions, DEFAULT_MAX_MESSAGE_SIZE, MIN_PACKET_SIZE};
use ase_protocol::{MAX_PACKET_SIZE, PACKET_SIZE};

/// Default number of prepared statements kept per connection.
pub const DEFAULT_STATEMENT_CACHE_SIZE: usize = 64;

/// Settings for a [`Conn`](crate::Conn).
///
/// Loading these from a DSN or the environment is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Frame size, header included.
    pub packet_size: usize,
    /// Channel id.
    pub channel: u16,
    /// Window credit written to outgoing frames.
    pub window: u8,
    /// Prepared statements kept per connection; `0` disables caching.
    pub statement_cache_size: usize,
    /// Upper bound for a whole exec call.
    pub command_timeout: Option<Duration>,
    /// Largest reply message accepted from the server.
    pub max_message_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            packet_size: PACKET_SIZE,
            channel: 0,
            window: 0,
            statement_cache_size: DEFAULT_STATEMENT_CACHE_SIZE,
            command_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl Config {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the packet size, clamped to the range a frame can express.
    #[must_use]
    pub fn packet_size(mut self, size: usize) -> Self {
        self.packet_size = size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
        self
    }

    /// Set the channel id.
    #[must_use]
    pub fn channel(mut self, channel: u16) -> Self {
        self.channel = channel;
        self
    }

    /// Set the window credit.
    #[must_use]
    pub fn window(mut self, window: u8) -> Self {
        self.window = window;
        self
    }

    /// Set the prepared statement cache size.
    #[must_use]
    pub fn statement_cache_size(mut self, size: usize) -> Self {
        self.statement_cache_size = size;
        self
    }

    /// Bound every exec call by `timeout`.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Disable the command timeout.
    #[must_use]
    pub fn no_command_timeout(mut self) -> Self {
        self.command_timeout = None;
        self
    }

    /// Set the largest reply message accepted from the server.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub(crate) fn channel_options(&self) -> ChannelOptions {
        ChannelOptions::default()
            .id(self.channel)
            .window(self.window)
            .packet_size(self.packet_size)
            .max_message_size(self.max_message_size)
    }
}
