//! Registry owning a set of connections.
//!
//! The registry is the single owner the connection contract expects:
//! everything else reaches a connection through its id or a
//! [`ConnectionRef`](crate::connection::ConnectionRef). Removing an entry
//! drops the connection, which closes it.
//!
//! # Example
//!
//! ```ignore
//! use spslip::{ConnectionRegistry, TcpConnection, TransportConfig};
//!
//! let mut registry = ConnectionRegistry::new();
//! let id = registry.insert(TcpConnection::new(stream, TransportConfig::default())?);
//!
//! // later, from an on_closed notification
//! registry.reap_closed();
//! ```

use std::collections::HashMap;

use crate::connection::{Connection, ConnectionId, ConnectionState};
use crate::error::Result;

/// Connections keyed by id.
pub struct ConnectionRegistry<C: Connection> {
    connections: HashMap<ConnectionId, C>,
}

impl<C: Connection> ConnectionRegistry<C> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Take ownership of `conn`.
    pub fn insert(&mut self, conn: C) -> ConnectionId {
        let id = conn.id();
        if self.connections.insert(id, conn).is_some() {
            tracing::warn!(conn = %id, "Replaced connection with duplicate id");
        }
        id
    }

    pub fn get(&self, id: ConnectionId) -> Option<&C> {
        self.connections.get(&id)
    }

    /// Give up ownership. The caller decides the connection's fate; dropping
    /// it closes it.
    pub fn remove(&mut self, id: ConnectionId) -> Option<C> {
        self.connections.remove(&id)
    }

    /// Close a connection but keep it registered until reaped.
    ///
    /// Returns `false` if the id is unknown.
    pub fn close(&self, id: ConnectionId) -> Result<bool> {
        match self.connections.get(&id) {
            Some(conn) => {
                conn.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop every connection that is already closed.
    ///
    /// Returns the ids that were removed.
    pub fn reap_closed(&mut self) -> Vec<ConnectionId> {
        let closed: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.state() == ConnectionState::Closed)
            .map(|(id, _)| *id)
            .collect();

        for id in &closed {
            self.connections.remove(id);
        }
        if !closed.is_empty() {
            tracing::debug!(count = closed.len(), "Reaped closed connections");
        }
        closed
    }

    /// Close and drop every connection.
    ///
    /// All connections are closed even if some fail; the first error is
    /// returned.
    pub fn close_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for (id, conn) in self.connections.drain() {
            if let Err(e) = conn.close() {
                tracing::warn!(conn = %id, error = %e, "Close failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ids of all registered connections, in no particular order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }
}

impl<C: Connection> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
