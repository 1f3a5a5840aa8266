//! Latest reading posted by a physical ESP32 probe.
//!
//! Probe data is held for the REST surface only; the simulated broadcast
//! stream is never interrupted or replaced by it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use scan_core::Esp32Reading;
use scan_protocol::Esp32Status;

/// Shared store for the most recent probe reading. Cheap to clone.
#[derive(Clone)]
pub struct Esp32Store {
    latest: Arc<RwLock<Option<Esp32Reading>>>,
    received: Arc<AtomicU64>,
    online_window_secs: i64,
}

impl Esp32Store {
    pub fn new(online_window_secs: i64) -> Self {
        Self {
            latest: Arc::new(RwLock::new(None)),
            received: Arc::new(AtomicU64::new(0)),
            online_window_secs,
        }
    }

    /// Replaces the latest reading.
    pub async fn record(&self, reading: Esp32Reading) {
        let count = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            device = %reading.device_id,
            lat = reading.location.lat,
            lng = reading.location.lng,
            depth = reading.location.depth,
            count,
            "Received ESP32 reading"
        );
        *self.latest.write().await = Some(reading);
    }

    pub async fn latest(&self) -> Option<Esp32Reading> {
        self.latest.read().await.clone()
    }

    /// Online/offline status as of `now`, with the total accepted since startup.
    pub async fn status(&self, now: DateTime<Utc>) -> Esp32Status {
        let latest = self.latest.read().await;
        match latest.as_ref() {
            Some(reading) => Esp32Status::from_reading(
                reading,
                now,
                self.online_window_secs,
                self.received.load(Ordering::Relaxed),
            ),
            None => Esp32Status::never_seen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use scan_core::{DeviceId, Location};

    fn reading(received_at: DateTime<Utc>) -> Esp32Reading {
        Esp32Reading::new(
            DeviceId::new("esp32-a"),
            Location::default(),
            40.0,
            vec![0.5],
            1,
            received_at,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = Esp32Store::new(30);
        assert!(store.latest().await.is_none());
        let status = store.status(Utc::now()).await;
        assert!(!status.connected);
        assert_eq!(status.readings_received, 0);
    }

    #[tokio::test]
    async fn test_record_replaces_latest() {
        let store = Esp32Store::new(30);
        let now = Utc::now();

        store.record(reading(now - Duration::seconds(10))).await;
        store.record(reading(now)).await;

        assert_eq!(store.latest().await.map(|r| r.received_at), Some(now));
        assert_eq!(store.status(now).await.readings_received, 2);
    }

    #[tokio::test]
    async fn test_status_goes_offline_after_window() {
        let store = Esp32Store::new(30);
        let received_at = Utc::now();
        store.record(reading(received_at)).await;

        assert!(store.status(received_at + Duration::seconds(29)).await.connected);
        assert!(!store.status(received_at + Duration::seconds(30)).await.connected);
    }
}
