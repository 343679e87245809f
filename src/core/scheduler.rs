//! Idle-or-delayed scheduling for prefetch work.
//!
//! Prefetch must never compete with work the user is waiting for. Two
//! strategies:
//! 1. [`IdleScheduler`]: hand the job to the pool's idle lane
//! 2. [`DelayScheduler`]: run the job after a short fixed delay
//!
//! [`select_scheduler`] picks one by asking the pool whether it has an idle
//! lane, once, at construction time.

use crossbeam::channel::{Sender, unbounded};
use log::{info, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::traits::{Job, Scheduler, TaskPool};

/// Default fallback delay when no idle lane is available
pub const DEFAULT_FALLBACK_DELAY_MS: u64 = 100;

/// Which scheduling strategy to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingMode {
    /// Idle lane if the pool has one, fixed delay otherwise
    #[default]
    Auto,
    /// Always the idle lane
    Idle,
    /// Always the fixed delay
    Delay,
}

/// Runs jobs on the pool's idle lane.
pub struct IdleScheduler {
    pool: Arc<dyn TaskPool>,
}

impl IdleScheduler {
    pub fn new(pool: Arc<dyn TaskPool>) -> Self {
        Self { pool }
    }
}

impl Scheduler for IdleScheduler {
    fn schedule(&self, job: Job) {
        self.pool.execute_idle(job);
    }

    fn name(&self) -> &'static str {
        "idle"
    }
}

/// Runs jobs on a timer thread after a fixed delay.
///
/// All jobs share the same delay, so submission order is deadline order and
/// a FIFO channel is enough.
pub struct DelayScheduler {
    delay: Duration,
    sender: Option<Sender<(Instant, Job)>>,
}

impl DelayScheduler {
    /// Create with custom delay
    pub fn new(delay_ms: u64) -> Self {
        let delay = Duration::from_millis(delay_ms);
        let (tx, rx) = unbounded::<(Instant, Job)>();

        let spawned = thread::Builder::new()
            .name("imgwarm-delay".to_string())
            .spawn(move || {
                // Exits once every sender is gone
                while let Ok((due, job)) = rx.recv() {
                    let now = Instant::now();
                    if due > now {
                        thread::sleep(due - now);
                    }
                    job();
                }
                trace!("Delay scheduler stopped");
            });

        let sender = match spawned {
            Ok(_) => Some(tx),
            Err(e) => {
                log::error!("Failed to spawn delay scheduler thread: {}", e);
                None
            }
        };

        Self { delay, sender }
    }

    /// Get current delay in milliseconds
    pub fn delay_ms(&self) -> u64 {
        self.delay.as_millis() as u64
    }
}

impl Default for DelayScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_DELAY_MS)
    }
}

impl Scheduler for DelayScheduler {
    fn schedule(&self, job: Job) {
        let due = Instant::now() + self.delay;
        match &self.sender {
            Some(sender) => {
                if let Err(e) = sender.send((due, job)) {
                    warn!("Delay scheduler closed, dropping job: {}", e);
                }
            }
            None => warn!("Delay scheduler has no timer thread, dropping job"),
        }
        trace!("DelayScheduler: job due in {}ms", self.delay.as_millis());
    }

    fn name(&self) -> &'static str {
        "delay"
    }
}

/// Choose a scheduler for `pool`.
pub fn select_scheduler(
    mode: SchedulingMode,
    pool: Arc<dyn TaskPool>,
    fallback_delay_ms: u64,
) -> Arc<dyn Scheduler> {
    let scheduler: Arc<dyn Scheduler> = match mode {
        SchedulingMode::Delay => Arc::new(DelayScheduler::new(fallback_delay_ms)),
        SchedulingMode::Auto | SchedulingMode::Idle if pool.supports_idle() => {
            Arc::new(IdleScheduler::new(pool))
        }
        SchedulingMode::Idle => {
            warn!("Idle scheduling requested but pool has no idle lane, using {}ms delay", fallback_delay_ms);
            Arc::new(DelayScheduler::new(fallback_delay_ms))
        }
        SchedulingMode::Auto => Arc::new(DelayScheduler::new(fallback_delay_ms)),
    };

    info!("Prefetch scheduling: {} (mode {:?})", scheduler.name(), mode);
    scheduler
}
