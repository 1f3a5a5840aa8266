//! The periodic broadcast loop.
//!
//! Exactly one loop runs per daemon. Once per interval it pulls a snapshot
//! from its [`SnapshotSource`], delivers it to every registered connection
//! and evicts the connections that failed.
//!
//! ```text
//!   Idle ──spawn──▶ Running ──cancel/stop──▶ Stopped
//!                     │  ▲
//!                     └──┘ tick: wait interval → next_snapshot → broadcast → evict
//! ```
//!
//! A fault inside one tick, including a panic in the snapshot source, is
//! logged and the loop carries on with the next tick. On stop the loop
//! releases every registered connection.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scan_core::{ConnectionId, LoopState, SensorSnapshot};

use crate::generator::SnapshotSource;
use crate::registry::{ConnectionRegistry, RegistryError};

/// Errors that abort a single tick. The loop itself keeps running.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Broadcast failed at tick {sequence}: {source}")]
    Registry {
        sequence: u64,
        #[source]
        source: RegistryError,
    },
}

/// What one tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: Arc<SensorSnapshot>,
    pub delivered: usize,
    pub evicted: Vec<ConnectionId>,
}

/// Read-only view of a running (or finished) loop. Cheap to clone.
#[derive(Clone)]
pub struct BroadcastStatus {
    state: watch::Receiver<LoopState>,
    latest: watch::Receiver<Option<Arc<SensorSnapshot>>>,
    ticks: Arc<AtomicU64>,
    interval: Duration,
}

impl BroadcastStatus {
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Most recent snapshot, `None` until the first tick.
    pub fn latest(&self) -> Option<Arc<SensorSnapshot>> {
        self.latest.borrow().clone()
    }

    /// Ticks completed successfully.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the loop reaches `target`. Returns `false` if the loop
    /// was dropped first.
    pub async fn wait_for(&mut self, target: LoopState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }
}

/// The single periodic broadcaster.
pub struct BroadcastLoop<S> {
    source: S,
    registry: ConnectionRegistry,
    interval: Duration,
    state: watch::Sender<LoopState>,
    latest: watch::Sender<Option<Arc<SensorSnapshot>>>,
    ticks: Arc<AtomicU64>,
}

impl<S: SnapshotSource + 'static> BroadcastLoop<S> {
    /// Creates an idle loop.
    pub fn new(source: S, registry: ConnectionRegistry, interval: Duration) -> Self {
        let (state, _) = watch::channel(LoopState::Idle);
        let (latest, _) = watch::channel(None);
        Self {
            source,
            registry,
            interval,
            state,
            latest,
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn status(&self) -> BroadcastStatus {
        BroadcastStatus {
            state: self.state.subscribe(),
            latest: self.latest.subscribe(),
            ticks: Arc::clone(&self.ticks),
            interval: self.interval,
        }
    }

    /// Starts the loop on its own task.
    ///
    /// The loop stops when `cancel_token` is cancelled or
    /// [`BroadcastHandle::stop`] is called.
    pub fn spawn(self, cancel_token: CancellationToken) -> BroadcastHandle {
        let status = self.status();
        let task = tokio::spawn(self.run(cancel_token.clone()));
        BroadcastHandle {
            status,
            cancel_token,
            task,
        }
    }

    /// Runs until cancelled. The first tick fires one interval after start.
    pub async fn run(mut self, cancel_token: CancellationToken) {
        self.transition(LoopState::Running);
        info!(interval_ms = self.interval.as_millis() as u64, "Broadcast loop started");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    debug!("Broadcast loop shutdown requested");
                    break;
                }

                _ = ticker.tick() => {
                    match AssertUnwindSafe(self.tick()).catch_unwind().await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            error!(error = %e, "Broadcast tick failed, continuing");
                        }
                        Err(panic) => {
                            error!(
                                panic = panic_message(&*panic),
                                "Broadcast tick panicked, continuing"
                            );
                        }
                    }
                }
            }
        }

        let released = self.registry.clear().await;
        self.transition(LoopState::Stopped);
        info!(
            ticks = self.ticks.load(Ordering::Relaxed),
            released,
            "Broadcast loop stopped"
        );
    }

    /// Runs one cycle: generate, deliver, evict.
    pub async fn tick(&mut self) -> Result<TickReport, BroadcastError> {
        let snapshot = Arc::new(self.source.next_snapshot());
        let sequence = snapshot.sequence;

        let sweep = self
            .registry
            .broadcast(&snapshot)
            .await
            .map_err(|source| BroadcastError::Registry { sequence, source })?;

        for id in &sweep.failed {
            if self.registry.unregister(*id).await {
                warn!(connection = %id, sequence, "Evicted connection after failed send");
            }
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.latest.send_replace(Some(Arc::clone(&snapshot)));

        debug!(
            sequence,
            delivered = sweep.delivered.len(),
            evicted = sweep.failed.len(),
            "Tick complete"
        );

        Ok(TickReport {
            snapshot,
            delivered: sweep.delivered.len(),
            evicted: sweep.failed,
        })
    }

    fn transition(&self, next: LoopState) {
        let current = *self.state.borrow();
        if current.can_transition_to(next) {
            self.state.send_replace(next);
        } else {
            warn!(from = %current, to = %next, "Ignoring invalid loop transition");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Owner of the spawned loop task.
pub struct BroadcastHandle {
    status: BroadcastStatus,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl BroadcastHandle {
    pub fn status(&self) -> BroadcastStatus {
        self.status.clone()
    }

    /// Signals the loop to stop and waits for it to release its connections.
    pub async fn stop(self) {
        self.cancel_token.cancel();
        self.join().await;
    }

    /// Waits for the loop to exit on its own (e.g. after external cancellation).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "Broadcast loop task failed");
        }
    }
}
