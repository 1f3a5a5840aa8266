//! Self-monitoring of the daemon process.
//!
//! A background task samples the daemon's CPU and memory every interval,
//! logs a warning when a threshold is crossed, and publishes the latest
//! sample for `GET /api/system/status`.

use std::process;
use std::time::Duration;

use sysinfo::{Pid, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;

/// One resource sample of the daemon process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessMetrics {
    pub memory_bytes: u64,
    pub memory_mb: u64,
    /// CPU usage as percentage of one core (can exceed 100)
    pub cpu_percent: f32,
    pub memory_high: bool,
    pub cpu_high: bool,
}

impl ProcessMetrics {
    pub fn is_any_high(&self) -> bool {
        self.memory_high || self.cpu_high
    }
}

/// Samples the current process through `sysinfo`.
pub struct ProcessMonitor {
    system: System,
    pid: Pid,
    memory_threshold_mb: u64,
    cpu_threshold_percent: f32,
}

impl ProcessMonitor {
    pub fn new(memory_threshold_mb: u64, cpu_threshold_percent: f32) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(process::id()),
            memory_threshold_mb,
            cpu_threshold_percent,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.memory_threshold_mb, config.cpu_threshold_percent)
    }

    /// Takes a fresh sample.
    ///
    /// CPU usage is relative to the previous call, so the first sample
    /// usually reports 0%. `refresh_all` is needed for the CPU figure; a
    /// single-process refresh leaves it at zero.
    pub fn sample(&mut self) -> ProcessMetrics {
        self.system.refresh_all();

        let (memory_bytes, cpu_percent) = self
            .system
            .process(self.pid)
            .map(|p| (p.memory(), p.cpu_usage()))
            .unwrap_or((0, 0.0));

        self.classify(memory_bytes, cpu_percent)
    }

    fn classify(&self, memory_bytes: u64, cpu_percent: f32) -> ProcessMetrics {
        let memory_mb = memory_bytes / 1024 / 1024;
        ProcessMetrics {
            memory_bytes,
            memory_mb,
            cpu_percent,
            memory_high: memory_mb > self.memory_threshold_mb,
            cpu_high: cpu_percent > self.cpu_threshold_percent,
        }
    }
}

/// Spawns the sampling task.
///
/// Returns the task handle and a receiver that always holds the latest
/// sample (all zeros until the first one is taken).
pub fn spawn_monitor_task(
    config: &MonitorConfig,
    cancel_token: CancellationToken,
) -> (JoinHandle<()>, watch::Receiver<ProcessMetrics>) {
    let (tx, rx) = watch::channel(ProcessMetrics::default());
    let mut monitor = ProcessMonitor::from_config(config);
    let period = Duration::from_secs(config.interval_secs.max(1));

    let task = tokio::spawn(async move {
        let mut tick = interval(period);

        info!(
            memory_threshold_mb = monitor.memory_threshold_mb,
            cpu_threshold_percent = monitor.cpu_threshold_percent,
            interval_secs = period.as_secs(),
            "Process monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    debug!("Process monitor shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let metrics = monitor.sample();
                    log_metrics(&metrics);
                    tx.send_replace(metrics);
                }
            }
        }
    });

    (task, rx)
}

fn log_metrics(metrics: &ProcessMetrics) {
    let cpu_percent = format!("{:.1}", metrics.cpu_percent);
    if metrics.memory_high {
        warn!(memory_mb = metrics.memory_mb, cpu_percent, "Daemon memory usage above threshold");
    } else if metrics.cpu_high {
        warn!(memory_mb = metrics.memory_mb, cpu_percent, "Daemon CPU usage above threshold");
    } else {
        debug!(memory_mb = metrics.memory_mb, cpu_percent, "Daemon resource usage");
    }
}
