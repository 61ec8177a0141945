//! SLIP echo server.
//!
//! Every frame received on a connection is sent back on it unchanged.
//!
//! ```text
//! cargo run --example echo -- 127.0.0.1:1977
//! RUST_LOG=spslip=debug cargo run --example echo
//! ```

use std::sync::Arc;

use spslip::{
    ChannelSink, Connection, ConnectionEvent, ConnectionRegistry, TcpConnection, TransportConfig,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:1977".to_string());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Echo server listening");

    let config = TransportConfig::default();
    let (sink, mut events) = ChannelSink::new();
    let sink = Arc::new(sink);
    let mut registry = ConnectionRegistry::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let conn = TcpConnection::new(stream, config.clone())?;
                conn.establish_read_channel(sink.clone())?;
                let id = registry.insert(conn);
                tracing::info!(conn = %id, %peer, "Client connected");
            }
            Some(event) = events.recv() => match event {
                ConnectionEvent::Frame { id, frame } => {
                    let Some(conn) = registry.get(id) else {
                        continue;
                    };
                    match conn.send(frame).await {
                        Ok(()) => {}
                        // Closed event follows; reaped there
                        Err(e) if e.is_terminal() => {
                            tracing::debug!(conn = %id, error = %e, "Echo on closed connection");
                        }
                        Err(e) => tracing::warn!(conn = %id, error = %e, "Echo failed"),
                    }
                }
                ConnectionEvent::Closed { id, reason } => {
                    tracing::info!(conn = %id, %reason, "Client disconnected");
                    registry.reap_closed();
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    registry.close_all()?;
    Ok(())
}
