//! Connection over a TCP stream.
//!
//! # Example
//!
//! ```ignore
//! use spslip::{Connection, TcpConnection, TransportConfig};
//!
//! let conn = TcpConnection::connect("127.0.0.1:5000", TransportConfig::default()).await?;
//! conn.send(b"hello".into()).await?;
//! conn.close()?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpStream, ToSocketAddrs};

use super::framed::FramedConnection;
use super::shared::{ConnectionRef, ReleaseHandle};
use super::sink::FrameSink;
use super::stats::ConnectionStats;
use super::{Connection, ConnectionId, ConnectionState};
use crate::config::TransportConfig;
use crate::error::Result;
use crate::slip::Frame;

/// SLIP-framed connection over `tokio::net::TcpStream`.
///
/// `close()` shuts the socket down in both directions before returning,
/// so the peer sees the end of the stream right away even while the
/// connection's tasks are still unwinding.
#[derive(Debug)]
pub struct TcpConnection {
    inner: FramedConnection,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl TcpConnection {
    /// Wrap an already-connected stream.
    pub fn new(stream: TcpStream, config: TransportConfig) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        // Second descriptor for the same socket, shut down by close()
        let handle = socket2::SockRef::from(&stream).try_clone()?;

        let (reader, writer) = stream.into_split();
        let inner = FramedConnection::with_handle(
            Box::new(reader),
            writer,
            config,
            ReleaseHandle::Socket(handle),
        )?;

        tracing::debug!(conn = %inner.id(), %peer_addr, "TCP connection established");
        Ok(Self {
            inner,
            peer_addr,
            local_addr,
        })
    }

    /// Connect to `addr` and wrap the stream.
    pub async fn connect<A: ToSocketAddrs>(addr: A, config: TransportConfig) -> Result<Self> {
        config.validate()?;
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream, config)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Weak handle for callbacks and other tasks.
    pub fn connection_ref(&self) -> ConnectionRef {
        self.inner.connection_ref()
    }

    pub fn config(&self) -> &TransportConfig {
        self.inner.config()
    }

    /// See [`FramedConnection::close_graceful`].
    pub async fn close_graceful(&self) -> Result<()> {
        self.inner.close_graceful().await
    }
}

impl Connection for TcpConnection {
    fn id(&self) -> ConnectionId {
        self.inner.id()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    fn send(&self, frame: Frame) -> impl std::future::Future<Output = Result<()>> + Send {
        self.inner.send(frame)
    }

    fn establish_read_channel(&self, sink: Arc<dyn FrameSink>) -> Result<()> {
        self.inner.establish_read_channel(sink)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn stats(&self) -> ConnectionStats {
        self.inner.stats()
    }
}
