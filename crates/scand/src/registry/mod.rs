//! Registry of live dashboard connections.
//!
//! The registry is the only owner of [`ConnectionHandle`]s. Gateway tasks
//! register a handle when a WebSocket is accepted and unregister it when the
//! socket closes; the broadcast loop sweeps every registered handle once per
//! tick and unregisters the ones that failed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  register/unregister  ┌──────────────────────────┐
//! │  stream handler │──────────────────────▶│   ConnectionRegistry     │
//! │  (per client)   │                       │ RwLock<BTreeMap<Id, H>>  │
//! └─────────────────┘                       └────────────┬─────────────┘
//!                                                        │ broadcast(snapshot)
//!                                                        ▼
//!                                    copy (id, sender) pairs, release lock,
//!                                    deliver concurrently, record outcomes
//! ```
//!
//! A sweep never holds the lock across a send, so a slow connection cannot
//! block registrations, and a registration during a sweep cannot invalidate
//! the set being delivered to.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Delivery failures are values, never errors that abort the sweep

mod connection;

pub use connection::{ConnectionHandle, Frame};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use scan_core::{ConnectionId, ConnectionView, SensorSnapshot, SendOutcome};

use crate::config::StreamConfig;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Too many connections (max: {max})")]
    TooManyConnections { max: usize },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result of delivering one frame to every registered connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections that accepted the frame
    pub delivered: Vec<ConnectionId>,
    /// Connections that were closed or timed out; the caller evicts these
    pub failed: Vec<ConnectionId>,
}

type ConnectionMap = Arc<RwLock<BTreeMap<ConnectionId, ConnectionHandle>>>;

/// Thread-safe set of open connections. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: ConnectionMap,
    max_connections: usize,
    send_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize, send_timeout: Duration) -> Self {
        Self {
            connections: Arc::new(RwLock::new(BTreeMap::new())),
            max_connections,
            send_timeout,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.max_connections, config.send_timeout())
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Adds a connection.
    ///
    /// Returns `Ok(false)` and leaves the registry untouched when a handle
    /// with the same id is already registered.
    ///
    /// # Errors
    ///
    /// - `RegistryError::TooManyConnections` if the registry is full
    pub async fn register(&self, handle: ConnectionHandle) -> Result<bool, RegistryError> {
        let mut connections = self.connections.write().await;
        let id = handle.id();

        if connections.contains_key(&id) {
            debug!(connection = %id, "Connection already registered");
            return Ok(false);
        }

        if connections.len() >= self.max_connections {
            warn!(
                connection = %id,
                current = connections.len(),
                max = self.max_connections,
                "Registry is full, rejecting connection"
            );
            return Err(RegistryError::TooManyConnections {
                max: self.max_connections,
            });
        }

        connections.insert(id, handle);
        info!(connection = %id, total = connections.len(), "Client connected");
        Ok(true)
    }

    /// Removes a connection. Returns `false` if it was not registered.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.remove(&id) {
            Some(handle) => {
                info!(
                    connection = %id,
                    delivered = handle.delivered(),
                    total = connections.len(),
                    "Client disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Serializes `snapshot` once and delivers it to every connection.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Serialize` if the snapshot cannot be encoded; nothing
    ///   is sent in that case
    pub async fn broadcast(&self, snapshot: &SensorSnapshot) -> Result<SweepReport, RegistryError> {
        let frame: Frame = Arc::from(snapshot.to_json()?);
        Ok(self.broadcast_frame(frame).await)
    }

    /// Delivers one frame to every registered connection.
    ///
    /// All attempts run concurrently, each bounded by the send timeout, and a
    /// failure never stops delivery to the others. Failed connections are
    /// reported, not removed.
    pub async fn broadcast_frame(&self, frame: Frame) -> SweepReport {
        let targets: Vec<_> = {
            let connections = self.connections.read().await;
            connections
                .values()
                .map(|handle| (handle.id(), handle.sender()))
                .collect()
        };

        if targets.is_empty() {
            return SweepReport::default();
        }

        let send_timeout = self.send_timeout;
        let attempts = targets.into_iter().map(|(id, sender)| {
            let frame = Arc::clone(&frame);
            async move { (id, connection::deliver(&sender, frame, send_timeout).await) }
        });
        let outcomes = join_all(attempts).await;

        let now = Utc::now();
        let mut report = SweepReport::default();
        let mut connections = self.connections.write().await;

        for (id, outcome) in outcomes {
            if let Some(handle) = connections.get_mut(&id) {
                handle.record(outcome, now);
            }
            match outcome {
                SendOutcome::Delivered => report.delivered.push(id),
                SendOutcome::Closed | SendOutcome::TimedOut => {
                    debug!(connection = %id, ?outcome, "Failed to send snapshot");
                    report.failed.push(id);
                }
            }
        }

        report
    }

    /// Drops every handle, closing each connection's outbound channel.
    pub async fn clear(&self) -> usize {
        let mut connections = self.connections.write().await;
        let released = connections.len();
        connections.clear();
        if released > 0 {
            info!(released, "Released all connections");
        }
        released
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Bookkeeping for every connection, ordered by id.
    pub async fn connections(&self) -> Vec<ConnectionView> {
        self.connections
            .read()
            .await
            .values()
            .map(ConnectionHandle::view)
            .collect()
    }
}
