//! One registered dashboard connection.
//!
//! The registry never touches a socket directly. Each connection owns a
//! bounded mpsc channel whose receiving end is drained by that connection's
//! writer task; delivering a frame means getting it into that channel
//! within the send timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::timeout;

use scan_core::{ConnectionId, ConnectionView, SendOutcome};

/// A serialized text frame, shared between all connections in a sweep.
pub type Frame = Arc<str>;

/// Registry-owned state for one open client channel.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    connected_at: DateTime<Utc>,
    sender: mpsc::Sender<Frame>,
    delivered: u64,
    last_send: Option<SendOutcome>,
    last_send_at: Option<DateTime<Utc>>,
}

impl ConnectionHandle {
    /// Creates a handle and the receiving end its writer task should drain.
    pub fn channel(id: ConnectionId, buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self::new(id, sender), receiver)
    }

    pub fn new(id: ConnectionId, sender: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            sender,
            delivered: 0,
            last_send: None,
            last_send_at: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Weak reference to the outbound channel.
    ///
    /// Lets the connection's own reader queue replies without keeping the
    /// channel open once the registry has dropped the handle.
    pub fn downgrade(&self) -> mpsc::WeakSender<Frame> {
        self.sender.downgrade()
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<Frame> {
        self.sender.clone()
    }

    pub(crate) fn record(&mut self, outcome: SendOutcome, at: DateTime<Utc>) {
        if outcome.is_delivered() {
            self.delivered += 1;
        }
        self.last_send = Some(outcome);
        self.last_send_at = Some(at);
    }

    pub fn view(&self) -> ConnectionView {
        ConnectionView {
            id: self.id,
            connected_at: self.connected_at,
            delivered: self.delivered,
            last_send: self.last_send,
            last_send_at: self.last_send_at,
        }
    }
}

/// Makes one bounded attempt to queue `frame` for a connection.
pub(crate) async fn deliver(
    sender: &mpsc::Sender<Frame>,
    frame: Frame,
    send_timeout: Duration,
) -> SendOutcome {
    if sender.is_closed() {
        return SendOutcome::Closed;
    }

    match timeout(send_timeout, sender.send(frame)).await {
        Ok(Ok(())) => SendOutcome::Delivered,
        Ok(Err(_)) => SendOutcome::Closed,
        Err(_) => SendOutcome::TimedOut,
    }
}
