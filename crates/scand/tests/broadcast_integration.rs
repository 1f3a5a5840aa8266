//! Integration tests for the connection registry and broadcast loop.
//!
//! These drive the registry and loop directly through their public API,
//! with plain mpsc receivers standing in for WebSocket writers.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

use std::time::Duration;

use scan_core::{ConnectionId, DeviceId, LoopState, Location, SensorBounds, SensorSnapshot};
use scand::broadcast::BroadcastLoop;
use scand::generator::{ReadingGenerator, SnapshotSource};
use scand::registry::{ConnectionHandle, ConnectionRegistry, Frame, RegistryError};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_secs(1);
const SEND_TIMEOUT: Duration = Duration::from_millis(100);

// ============================================================================
// Test Helpers
// ============================================================================

fn generator(seed: u64) -> ReadingGenerator {
    ReadingGenerator::seeded(
        seed,
        DeviceId::default(),
        Location::default(),
        SensorBounds::default(),
    )
    .unwrap()
}

fn registry(max: usize) -> ConnectionRegistry {
    ConnectionRegistry::new(max, SEND_TIMEOUT)
}

async fn connect(registry: &ConnectionRegistry, id: u64, buffer: usize) -> mpsc::Receiver<Frame> {
    let (handle, rx) = ConnectionHandle::channel(ConnectionId::new(id), buffer);
    assert!(registry.register(handle).await.unwrap());
    rx
}

fn parse(frame: &Frame) -> serde_json::Value {
    serde_json::from_str(frame).expect("frame should be JSON")
}

/// Tags each snapshot's device id with its sequence so receivers can
/// check ordering from the wire frame alone.
struct TaggedSource {
    inner: ReadingGenerator,
}

impl SnapshotSource for TaggedSource {
    fn next_snapshot(&mut self) -> SensorSnapshot {
        let mut snapshot = self.inner.next();
        snapshot.device_id = DeviceId::new(format!("seq-{}", snapshot.sequence));
        snapshot
    }
}

/// Panics on exactly one call, then behaves like the wrapped generator.
struct PanicsOnceSource {
    inner: ReadingGenerator,
    calls: u32,
    panic_on: u32,
}

impl SnapshotSource for PanicsOnceSource {
    fn next_snapshot(&mut self) -> SensorSnapshot {
        self.calls += 1;
        if self.calls == self.panic_on {
            panic!("sensor read failed on call {}", self.calls);
        }
        self.inner.next()
    }
}

fn sequence_of(frame: &Frame) -> u64 {
    parse(frame)["device_id"]
        .as_str()
        .and_then(|id| id.strip_prefix("seq-"))
        .and_then(|n| n.parse().ok())
        .expect("tagged device id")
}

// ============================================================================
// Fan-out Tests
// ============================================================================

#[tokio::test]
async fn test_every_connection_receives_each_snapshot() {
    let registry = registry(8);
    let mut receivers = Vec::new();
    for id in 0..3 {
        receivers.push(connect(&registry, id, 8).await);
    }

    let mut broadcaster = BroadcastLoop::new(generator(1), registry.clone(), INTERVAL);
    let report = broadcaster.tick().await.unwrap();
    assert_eq!(report.delivered, 3);
    assert!(report.evicted.is_empty());

    for rx in &mut receivers {
        let frame = rx.recv().await.expect("snapshot");
        let json = parse(&frame);

        assert!(json["timestamp"].is_string());
        assert_eq!(json["device_id"], "archaeoscan_001");
        assert_eq!(json["status"], "active");
        for field in [
            "battery",
            "temperature",
            "pressure",
            "humidity",
            "turbidity",
            "tds",
            "depth",
            "ph",
        ] {
            assert!(json["sensors"][field].is_number(), "missing {field}");
        }
        for vector in ["magnetometer", "accelerometer", "gyroscope"] {
            for axis in ["x", "y", "z"] {
                assert!(json["sensors"][vector][axis].is_number(), "missing {vector}.{axis}");
            }
        }
        assert_eq!(json["location"]["lat"], 40.7128);
        assert!(json.get("sequence").is_none());
    }
}

#[tokio::test]
async fn test_all_connections_get_identical_frame() {
    let registry = registry(8);
    let mut a = connect(&registry, 1, 8).await;
    let mut b = connect(&registry, 2, 8).await;

    let mut broadcaster = BroadcastLoop::new(generator(2), registry, INTERVAL);
    broadcaster.tick().await.unwrap();

    assert_eq!(a.recv().await.unwrap(), b.recv().await.unwrap());
}

#[tokio::test]
async fn test_tick_without_connections_still_advances() {
    let registry = registry(8);
    let mut broadcaster = BroadcastLoop::new(generator(3), registry, INTERVAL);
    let status = broadcaster.status();

    let report = broadcaster.tick().await.unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(status.ticks(), 1);
    assert!(status.latest().is_some());
}

// ============================================================================
// Failure Isolation Tests
// ============================================================================

#[tokio::test]
async fn test_closed_connection_evicted_others_unaffected() {
    let registry = registry(8);
    let mut first = connect(&registry, 1, 8).await;
    let closed = connect(&registry, 2, 8).await;
    let mut third = connect(&registry, 3, 8).await;
    drop(closed);

    let mut broadcaster = BroadcastLoop::new(generator(4), registry.clone(), INTERVAL);
    let report = broadcaster.tick().await.unwrap();

    assert_eq!(report.delivered, 2);
    assert_eq!(report.evicted, vec![ConnectionId::new(2)]);
    assert!(first.recv().await.is_some());
    assert!(third.recv().await.is_some());

    assert_eq!(registry.len().await, 2);
    assert!(!registry.contains(ConnectionId::new(2)).await);
    assert!(registry.contains(ConnectionId::new(1)).await);
    assert!(registry.contains(ConnectionId::new(3)).await);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_connection_times_out_without_stalling_others() {
    let registry = registry(8);
    let mut fast = connect(&registry, 1, 8).await;
    // Never drained; the second frame cannot be queued.
    let _stalled = connect(&registry, 2, 1).await;

    let mut broadcaster = BroadcastLoop::new(generator(5), registry.clone(), INTERVAL);

    let first = broadcaster.tick().await.unwrap();
    assert_eq!(first.delivered, 2);

    let started = Instant::now();
    let second = broadcaster.tick().await.unwrap();
    assert!(started.elapsed() < SEND_TIMEOUT * 2);

    assert_eq!(second.delivered, 1);
    assert_eq!(second.evicted, vec![ConnectionId::new(2)]);
    assert!(fast.recv().await.is_some());
    assert!(fast.recv().await.is_some());
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_evicted_connection_receiver_sees_close() {
    let registry = registry(8);
    let (handle, mut rx) = ConnectionHandle::channel(ConnectionId::new(9), 1);
    let weak = handle.downgrade();
    registry.register(handle).await.unwrap();

    // Dropping the registry's handle leaves no strong sender behind.
    assert!(registry.unregister(ConnectionId::new(9)).await);
    assert!(weak.upgrade().is_none());
    assert!(rx.recv().await.is_none());
}

// ============================================================================
// Registry Bookkeeping Tests
// ============================================================================

#[tokio::test]
async fn test_size_tracks_registrations_minus_removals() {
    let registry = registry(32);
    let mut receivers = Vec::new();
    for id in 0..10 {
        receivers.push(connect(&registry, id, 4).await);
    }

    for id in (0..10).step_by(2) {
        assert!(registry.unregister(ConnectionId::new(id)).await);
    }

    assert_eq!(registry.len().await, 5);
    let ids: Vec<_> = registry.connections().await.iter().map(|c| c.id.get()).collect();
    assert_eq!(ids, vec![1, 3, 5, 7, 9]);
}

#[tokio::test]
async fn test_unregister_is_idempotent() {
    let registry = registry(8);
    let _rx = connect(&registry, 1, 4).await;

    assert!(registry.unregister(ConnectionId::new(1)).await);
    assert!(!registry.unregister(ConnectionId::new(1)).await);
    assert!(!registry.unregister(ConnectionId::new(42)).await);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_duplicate_register_is_ignored() {
    let registry = registry(8);
    let _rx = connect(&registry, 1, 4).await;

    let (again, _rx2) = ConnectionHandle::channel(ConnectionId::new(1), 4);
    assert!(!registry.register(again).await.unwrap());
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_register_rejected_when_full() {
    let registry = registry(2);
    let _a = connect(&registry, 1, 4).await;
    let _b = connect(&registry, 2, 4).await;

    let (extra, _rx) = ConnectionHandle::channel(ConnectionId::new(3), 4);
    let err = registry.register(extra).await.unwrap_err();
    assert!(matches!(err, RegistryError::TooManyConnections { max: 2 }));
    assert_eq!(registry.len().await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registration_during_sweeps() {
    let registry = registry(256);
    let mut broadcaster = BroadcastLoop::new(generator(6), registry.clone(), INTERVAL);

    let mut joins = Vec::new();
    for id in 0..64u64 {
        let registry = registry.clone();
        joins.push(tokio::spawn(async move {
            let (handle, rx) = ConnectionHandle::channel(ConnectionId::new(id), 64);
            registry.register(handle).await.unwrap();
            rx
        }));
    }

    for _ in 0..10 {
        broadcaster.tick().await.unwrap();
    }

    let mut receivers = Vec::new();
    for join in joins {
        receivers.push(join.await.unwrap());
    }

    assert_eq!(registry.len().await, 64);
    broadcaster.tick().await.unwrap();
    for rx in &mut receivers {
        // Joined at different points, but every one got the last tick.
        assert!(rx.recv().await.is_some());
    }
}

// ============================================================================
// Loop Lifecycle Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_per_connection_order_follows_ticks() {
    let registry = registry(8);
    let mut rx = connect(&registry, 1, 32).await;

    let source = TaggedSource { inner: generator(7) };
    let handle = BroadcastLoop::new(source, registry, INTERVAL).spawn(CancellationToken::new());

    let mut last = None;
    for _ in 0..5 {
        let frame = rx.recv().await.unwrap();
        let sequence = sequence_of(&frame);
        if let Some(previous) = last {
            assert!(sequence > previous, "{sequence} after {previous}");
        }
        last = Some(sequence);
    }

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_takes_effect_within_one_interval() {
    let registry = registry(8);
    let mut rx = connect(&registry, 1, 32).await;

    let broadcaster = BroadcastLoop::new(generator(8), registry.clone(), INTERVAL);
    let mut status = broadcaster.status();
    let handle = broadcaster.spawn(CancellationToken::new());

    rx.recv().await.expect("first snapshot");
    rx.recv().await.expect("second snapshot");

    let requested = Instant::now();
    handle.stop().await;
    assert!(requested.elapsed() < INTERVAL);
    assert!(status.wait_for(LoopState::Stopped).await);

    // Anything still queued was produced before stop; then the channel closes.
    let mut after = 0;
    while timeout(INTERVAL * 3, rx.recv()).await.unwrap().is_some() {
        after += 1;
    }
    assert_eq!(2 + after, status.ticks());
    assert!(registry.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_tick_does_not_stop_the_loop() {
    let registry = registry(8);
    let mut rx = connect(&registry, 1, 32).await;

    let source = PanicsOnceSource {
        inner: generator(10),
        calls: 0,
        panic_on: 2,
    };
    let broadcaster = BroadcastLoop::new(source, registry.clone(), INTERVAL);
    let mut status = broadcaster.status();
    let handle = broadcaster.spawn(CancellationToken::new());

    let started = Instant::now();
    rx.recv().await.expect("snapshot before the panic");
    rx.recv().await.expect("snapshot after the panic");
    rx.recv().await.expect("later snapshot");

    // The panicking tick produced nothing; the next two still arrived on schedule.
    assert!(started.elapsed() >= INTERVAL * 4);
    assert_eq!(status.state(), LoopState::Running);
    assert!(status.ticks() >= 2);
    assert!(registry.contains(ConnectionId::new(1)).await);

    handle.stop().await;
    assert!(status.wait_for(LoopState::Stopped).await);
    assert!(registry.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_loop_continues_while_connections_churn() {
    let registry = registry(8);
    let broadcaster = BroadcastLoop::new(generator(9), registry.clone(), INTERVAL);
    let status = broadcaster.status();
    let handle = broadcaster.spawn(CancellationToken::new());

    let mut first = connect(&registry, 1, 8).await;
    first.recv().await.unwrap();
    drop(first);

    let mut second = connect(&registry, 2, 8).await;
    second.recv().await.unwrap();
    second.recv().await.unwrap();

    assert!(!registry.contains(ConnectionId::new(1)).await);
    assert!(status.ticks() >= 2);
    assert_eq!(status.state(), LoopState::Running);

    handle.stop().await;
}
