//! Mock ASE server for unit testing.
//!
//! The server speaks the frame and package protocol over TCP and answers
//! every logical message it receives with the next reply from a script.
//! Login is not simulated; a client talks to it as if already logged in.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ase_testing::mock_server::{MockAseServer, MockReply};
//!
//! #[tokio::test]
//! async fn test_update() {
//!     let server = MockAseServer::builder()
//!         .reply(MockReply::affected(3))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let stream = tokio::net::TcpStream::connect(server.addr()).await.unwrap();
//!     // Hand the stream to a connection...
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use ase_codec::{Channel, ChannelOptions, CodecError};
use ase_protocol::{
    DataFormat, Done, DoneStatus, Dynamic, Eed, Package, PackageParser, PacketType,
    ParamFmt, ProtocolError, Row, RowFmt,
};
use bytes::Bytes;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A scripted reply could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// A logical message received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRequest {
    /// Message type of the first frame.
    pub packet_type: PacketType,
    /// Reassembled payload.
    pub payload: Bytes,
}

impl MockRequest {
    /// Parse the payload into packages.
    pub fn packages(&self) -> std::result::Result<Vec<Package>, ProtocolError> {
        let mut parser = PackageParser::new(self.payload.clone());
        let mut packages = Vec::new();
        while let Some(package) = parser.next_package()? {
            packages.push(package);
        }
        Ok(packages)
    }

    /// Text of the language command, if this is one.
    #[must_use]
    pub fn language_text(&self) -> Option<String> {
        self.packages().ok()?.into_iter().find_map(|p| match p {
            Package::Language(lang) => Some(lang.text),
            _ => None,
        })
    }

    /// The dynamic statement package, if the request carries one.
    #[must_use]
    pub fn dynamic(&self) -> Option<Dynamic> {
        self.packages().ok()?.into_iter().find_map(|p| match p {
            Package::Dynamic(dynamic) => Some(dynamic),
            _ => None,
        })
    }
}

/// Handler computing a reply from the request.
pub type ReplyFn = Arc<dyn Fn(&MockRequest) -> MockReply + Send + Sync>;

/// Scripted answer to one client message.
#[derive(Clone)]
pub enum MockReply {
    /// Encode the packages into one response message.
    Packages(Vec<Package>),

    /// Send the bytes as the payload of one response message.
    Raw(Bytes),

    /// Send nothing.
    Silence,

    /// Close the connection.
    Close,

    /// Compute the reply from the request.
    Custom(ReplyFn),
}

impl fmt::Debug for MockReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packages(packages) => f.debug_tuple("Packages").field(packages).finish(),
            Self::Raw(data) => f.debug_tuple("Raw").field(&data.len()).finish(),
            Self::Silence => f.write_str("Silence"),
            Self::Close => f.write_str("Close"),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockReply {
    /// A final DONE without a count.
    #[must_use]
    pub fn done() -> Self {
        Self::Packages(vec![final_done(None)])
    }

    /// A final DONE reporting `count` affected rows.
    #[must_use]
    pub fn affected(count: i32) -> Self {
        Self::Packages(vec![final_done(Some(count))])
    }

    /// A result set followed by a final DONE counting its rows.
    #[must_use]
    pub fn rows(formats: Vec<DataFormat>, rows: Vec<Vec<Option<Bytes>>>) -> Self {
        let count = i32::try_from(rows.len()).unwrap_or(i32::MAX);
        let mut packages = Vec::with_capacity(rows.len() + 2);
        packages.push(Package::RowFmt(RowFmt::new(formats)));
        packages.extend(rows.into_iter().map(|values| Package::Row(Row { values })));
        packages.push(final_done(Some(count)));
        Self::Packages(packages)
    }

    /// A server error followed by a final DONE with the error bit.
    #[must_use]
    pub fn error(number: i32, severity: u8, message: impl Into<String>) -> Self {
        Self::Packages(vec![
            Package::Eed(Eed::new(number, severity, message)),
            Package::Done(Done::new(DoneStatus::FINAL | DoneStatus::ERROR, 0)),
        ])
    }

    /// Acknowledge a dynamic request, echoing its statement id.
    ///
    /// With `param_formats` the acknowledgement also describes the
    /// statement's parameters.
    #[must_use]
    pub fn dynamic_ack(param_formats: Option<Vec<DataFormat>>) -> Self {
        Self::Custom(Arc::new(move |request| {
            let id = request.dynamic().map(|d| d.id).unwrap_or_default();
            let mut packages = vec![Package::Dynamic(Dynamic::ack(id))];
            if let Some(formats) = &param_formats {
                packages.push(Package::ParamFmt(ParamFmt::new(formats.clone())));
            }
            packages.push(final_done(None));
            Self::Packages(packages)
        }))
    }

    /// Compute the reply from the request.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&MockRequest) -> MockReply + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }
}

fn final_done(count: Option<i32>) -> Package {
    match count {
        Some(count) => Package::Done(Done::new(DoneStatus::FINAL | DoneStatus::COUNT, count)),
        None => Package::Done(Done::new(DoneStatus::FINAL, 0)),
    }
}

/// Configuration for the mock server.
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Replies, consumed in order by each connection.
    script: Vec<MockReply>,
    /// Reply once the script is exhausted.
    default_reply: MockReply,
    /// Channel settings for server frames.
    channel: ChannelOptions,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            script: Vec::new(),
            default_reply: MockReply::done(),
            channel: ChannelOptions::default(),
        }
    }
}

/// Builder for [`MockAseServer`].
#[derive(Debug, Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scripted reply.
    #[must_use]
    pub fn reply(mut self, reply: MockReply) -> Self {
        self.config.script.push(reply);
        self
    }

    /// Set the reply used once the script is exhausted.
    #[must_use]
    pub fn default_reply(mut self, reply: MockReply) -> Self {
        self.config.default_reply = reply;
        self
    }

    /// Set the channel id the server expects and writes.
    #[must_use]
    pub fn channel(mut self, id: u16) -> Self {
        self.config.channel = self.config.channel.id(id);
        self
    }

    /// Set the frame size of server replies.
    #[must_use]
    pub fn packet_size(mut self, size: usize) -> Self {
        self.config.channel = self.config.channel.packet_size(size);
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockAseServer> {
        MockAseServer::start(self.config).await
    }
}

/// A mock ASE server for testing.
#[derive(Debug)]
pub struct MockAseServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    requests: Arc<Mutex<Vec<MockRequest>>>,
    connection_count: Arc<Mutex<usize>>,
}

impl MockAseServer {
    /// Create a new builder for the mock server.
    #[must_use]
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connection_count = Arc::new(Mutex::new(0usize));

        let server = Self {
            addr,
            shutdown: shutdown.clone(),
            requests: requests.clone(),
            connection_count: connection_count.clone(),
        };

        let config = Arc::new(config);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                let config = config.clone();
                                let requests = requests.clone();
                                let count = connection_count.clone();
                                let shutdown = shutdown.clone();
                                tokio::spawn(async move {
                                    *count.lock().await += 1;
                                    if let Err(e) =
                                        handle_connection(stream, &config, &requests, &shutdown).await
                                    {
                                        tracing::debug!("connection error: {}", e);
                                    }
                                    let mut c = count.lock().await;
                                    *c = c.saturating_sub(1);
                                });
                            }
                            Err(e) => {
                                tracing::error!("accept error: {}", e);
                                break;
                            }
                        }
                    }
                    () = shutdown.cancelled() => break,
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Open a TCP connection to the server.
    pub async fn connect(&self) -> Result<TcpStream> {
        Ok(TcpStream::connect(self.addr).await?)
    }

    /// All messages received so far, across connections, in arrival order.
    pub async fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().await.clone()
    }

    /// Get the current connection count.
    pub async fn connection_count(&self) -> usize {
        *self.connection_count.lock().await
    }

    /// Stop the server and close open connections.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for MockAseServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Serve one client connection until it closes or the script says so.
async fn handle_connection(
    stream: TcpStream,
    config: &MockServerConfig,
    requests: &Mutex<Vec<MockRequest>>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let mut channel = Channel::new(stream, config.channel);
    let mut script: VecDeque<MockReply> = config.script.iter().cloned().collect();

    loop {
        let message = match channel.read_message(shutdown).await {
            Ok(message) => message,
            Err(CodecError::ConnectionClosed | CodecError::Cancelled) => break,
            Err(e) => return Err(e.into()),
        };

        let request = MockRequest {
            packet_type: message.packet_type,
            payload: message.payload,
        };
        tracing::debug!(packet_type = ?request.packet_type, len = request.payload.len(), "mock request");
        requests.lock().await.push(request.clone());

        let mut reply = script
            .pop_front()
            .unwrap_or_else(|| config.default_reply.clone());
        while let MockReply::Custom(f) = reply {
            reply = f(&request);
        }

        match reply {
            MockReply::Packages(packages) => {
                let payload = Package::encode_all(&packages)?;
                channel
                    .send_message(PacketType::Response, payload, shutdown)
                    .await?;
            }
            MockReply::Raw(payload) => {
                channel
                    .send_message(PacketType::Response, payload, shutdown)
                    .await?;
            }
            MockReply::Close => break,
            MockReply::Silence | MockReply::Custom(_) => {}
        }
    }

    Ok(())
}
