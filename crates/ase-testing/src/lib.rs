//! # ase-testing
//!
//! Test infrastructure for ASE driver development.
//!
//! This crate provides a mock server that speaks the frame and package
//! protocol, so the client engine can be tested without a real server.
//!
//! ## Mock Server Example
//!
//! ```rust,ignore
//! use ase_testing::{MockAseServer, MockReply};
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockAseServer::builder()
//!         .reply(MockReply::affected(1))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let stream = server.connect().await.unwrap();
//!     // Hand the stream to a connection...
//!
//!     let requests = server.requests().await;
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_server;

pub use mock_server::{
    MockAseServer, MockReply, MockRequest, MockServerBuilder, MockServerConfig, MockServerError,
    ReplyFn,
};
