//! Identity and bookkeeping for dashboard connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for one streaming connection.
///
/// Assigned by the gateway from a monotonically increasing counter, so two
/// live connections never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of the most recent delivery attempt to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    /// Frame accepted by the connection's writer
    Delivered,
    /// Writer gone (client disconnected)
    Closed,
    /// Writer did not accept the frame within the send timeout
    TimedOut,
}

impl SendOutcome {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Read-only view of a registered connection for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionView {
    pub id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    /// Snapshots delivered so far
    pub delivered: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_send: Option<SendOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_send_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(42).to_string(), "conn-42");
    }

    #[test]
    fn test_connection_id_serializes_as_number() {
        let json = serde_json::to_string(&ConnectionId::new(3)).unwrap();
        assert_eq!(json, "3");
    }

    #[test]
    fn test_view_omits_missing_send() {
        let view = ConnectionView {
            id: ConnectionId::new(1),
            connected_at: Utc::now(),
            delivered: 0,
            last_send: None,
            last_send_at: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("last_send").is_none());
        assert_eq!(json["delivered"], 0);
    }

    #[test]
    fn test_send_outcome_wire_names() {
        assert_eq!(
            serde_json::to_string(&SendOutcome::TimedOut).unwrap(),
            "\"timed_out\""
        );
        assert!(SendOutcome::Delivered.is_delivered());
        assert!(!SendOutcome::Closed.is_delivered());
    }
}
