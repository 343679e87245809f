//! Boundary traits for the preload cache.
//!
//! The cache never touches the network, the filesystem or threads directly.
//! It talks to three capabilities supplied by the composition root:
//! - [`Fetcher`]: load one resource, report loaded / failed
//! - [`TaskPool`]: run a fetch off the caller's thread
//! - [`Scheduler`]: run low-priority work when the host is idle (or later)
//!
//! Implementations live in `fetcher`, `workers` and `scheduler`.

use std::sync::Arc;

/// Boxed unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Result of a single fetch attempt.
///
/// Only the two outcomes matter to the cache; bodies and headers are never
/// needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded,
    Failed,
}

impl FetchOutcome {
    pub fn is_loaded(self) -> bool {
        self == FetchOutcome::Loaded
    }
}

/// Resource fetch boundary.
///
/// Called on a pool thread. Must not panic under normal operation; a panic
/// is treated by the cache as a failed attempt.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, key: &str) -> FetchOutcome;
}

/// Where fetches and idle work run.
pub trait TaskPool: Send + Sync {
    /// Run job as soon as a thread is free.
    fn execute(&self, job: Job);

    /// Run job only when no regular work is waiting.
    ///
    /// Pools without an idle lane run it as regular work.
    fn execute_idle(&self, job: Job) {
        self.execute(job)
    }

    /// Whether `execute_idle` really defers to idle time.
    fn supports_idle(&self) -> bool {
        false
    }
}

/// Low-priority scheduling boundary ("when idle, or after a short delay").
pub trait Scheduler: Send + Sync {
    fn schedule(&self, job: Job);

    /// Strategy name for logs.
    fn name(&self) -> &'static str;
}

/// Blanket impl: Arc<T> implements traits if T does
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn fetch(&self, key: &str) -> FetchOutcome {
        (**self).fetch(key)
    }
}

impl<T: TaskPool + ?Sized> TaskPool for Arc<T> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }

    fn execute_idle(&self, job: Job) {
        (**self).execute_idle(job)
    }

    fn supports_idle(&self) -> bool {
        (**self).supports_idle()
    }
}

impl<T: Scheduler + ?Sized> Scheduler for Arc<T> {
    fn schedule(&self, job: Job) {
        (**self).schedule(job)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
