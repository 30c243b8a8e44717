//! Shared helpers for client integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::io;
use std::sync::{Arc, Mutex};

use ase_client::{Config, Conn, HookRegistry};
use ase_protocol::{DataFormat, DataType, Done, DoneStatus, Package, Row, format_status};
use ase_testing::{MockAseServer, MockReply};
use bytes::Bytes;
use tokio::net::TcpStream;

/// Route library logs to the test harness; set `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log output captured by [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture `warn` and above on the current thread until the guard drops.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

/// Start a server answering with `replies` in order.
pub async fn server(replies: Vec<MockReply>) -> MockAseServer {
    init_tracing();
    let mut builder = MockAseServer::builder();
    for reply in replies {
        builder = builder.reply(reply);
    }
    builder.build().await.expect("mock server should start")
}

/// Connect with the default configuration and no hooks.
pub async fn connect(server: &MockAseServer) -> Conn<TcpStream> {
    connect_with(server, Config::default(), HookRegistry::empty()).await
}

/// Connect with `config` and `hooks`.
pub async fn connect_with(
    server: &MockAseServer,
    config: Config,
    hooks: Arc<HookRegistry>,
) -> Conn<TcpStream> {
    let stream = server.connect().await.expect("connect to mock server");
    Conn::new(stream, config, hooks)
}

pub fn done(status: DoneStatus, count: i32) -> Package {
    Package::Done(Done::new(status, count))
}

pub fn int_column(name: &str) -> DataFormat {
    DataFormat::new(DataType::Int4).with_name(name)
}

pub fn varchar_column(name: &str) -> DataFormat {
    DataFormat::new(DataType::VarChar)
        .with_name(name)
        .with_max_length(255)
        .with_status(format_status::NULLABLE)
}

pub fn int_value(v: i32) -> Option<Bytes> {
    Some(Bytes::copy_from_slice(&v.to_le_bytes()))
}

pub fn text_value(s: &str) -> Option<Bytes> {
    Some(Bytes::copy_from_slice(s.as_bytes()))
}

pub fn row(values: Vec<Option<Bytes>>) -> Package {
    Package::Row(Row { values })
}
