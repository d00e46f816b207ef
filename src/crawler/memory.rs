//! Background memory sampling
//!
//! A tokio task samples the resident size of the process on a fixed interval
//! and publishes the latest value through atomics. Readers never block and
//! never wait for a sample.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::crawler::config::MemoryThresholds;

const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Source of memory usage samples
pub trait MemoryProbe: Send + Sync + 'static {
    /// Current resident size in bytes, or `None` when it cannot be read
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads the resident set size of the current process
pub struct ProcessMemoryProbe {
    pid: Option<Pid>,
    system: std::sync::Mutex<System>,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| warn!("Cannot determine current pid: {}", e))
            .ok();
        Self {
            pid,
            system: std::sync::Mutex::new(System::new()),
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|process| process.memory())
    }
}

#[derive(Debug, Default)]
struct Sample {
    resident: AtomicU64,
}

/// Periodic observer of process memory
///
/// Dropping the monitor stops the sampling task.
#[derive(Debug)]
pub struct MemoryMonitor {
    thresholds: MemoryThresholds,
    sample: Arc<Sample>,
    task: JoinHandle<()>,
}

impl MemoryMonitor {
    /// Take one sample immediately and keep sampling in the background
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<P: MemoryProbe>(probe: P, thresholds: MemoryThresholds) -> Self {
        let sample = Arc::new(Sample::default());
        if let Some(bytes) = probe.resident_bytes() {
            sample.resident.store(bytes, Ordering::Relaxed);
        }

        let task = tokio::spawn({
            let sample = sample.clone();
            async move {
                let mut ticker = interval(thresholds.sample_interval.max(MIN_SAMPLE_INTERVAL));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    match probe.resident_bytes() {
                        Some(bytes) => sample.resident.store(bytes, Ordering::Relaxed),
                        None => debug!("Memory sample unavailable"),
                    }
                }
            }
        });

        Self {
            thresholds,
            sample,
            task,
        }
    }

    /// Monitor for the current process
    pub fn for_current_process(thresholds: MemoryThresholds) -> Self {
        Self::spawn(ProcessMemoryProbe::new(), thresholds)
    }

    /// Latest resident size in bytes (zero until the first successful sample)
    pub fn resident_bytes(&self) -> u64 {
        self.sample.resident.load(Ordering::Relaxed)
    }

    /// Whether usage is above the soft threshold
    pub fn under_pressure(&self) -> bool {
        self.resident_bytes() > self.thresholds.soft_limit_bytes
    }

    /// Whether usage is above the hard threshold
    pub fn must_abort(&self) -> bool {
        self.resident_bytes() > self.thresholds.hard_limit_bytes
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
