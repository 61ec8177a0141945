//! # spslip
//!
//! SLIP-framed transport for SmartPort disk emulation over TCP.
//!
//! The crate sits between a byte stream and a protocol layer: outbound
//! frames are byte-stuffed and written, inbound bytes are reassembled into
//! frames and handed upward one at a time.
//!
//! ## Architecture
//!
//! - **Framing** ([`slip`]): pure SLIP encoder and streaming decoder
//! - **Connections** ([`connection`]): the [`Connection`] contract with a
//!   generic stream variant and a TCP variant, each running a read task and
//!   a writer task
//! - **Registry** ([`registry`]): single owner of live connections
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use spslip::{ChannelSink, Connection, ConnectionEvent, TcpConnection, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> spslip::Result<()> {
//!     let conn = TcpConnection::connect("127.0.0.1:1977", TransportConfig::default()).await?;
//!
//!     let (sink, mut events) = ChannelSink::new();
//!     conn.establish_read_channel(Arc::new(sink))?;
//!
//!     conn.send(b"\x01\x02".into()).await?;
//!     while let Some(event) = events.recv().await {
//!         if let ConnectionEvent::Frame { frame, .. } = event {
//!             println!("{} bytes", frame.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod registry;
pub mod slip;

pub use config::TransportConfig;
#[cfg(feature = "tcp")]
pub use connection::TcpConnection;
pub use connection::{
    ChannelSink, CloseReason, Connection, ConnectionEvent, ConnectionId, ConnectionRef,
    ConnectionState, ConnectionStats, FrameSink, FramedConnection,
};
pub use error::{ConnectionError, FramingError, Result};
pub use registry::ConnectionRegistry;
pub use slip::Frame;
