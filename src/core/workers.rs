//! Thread pool for fetches and idle-time prefetch.
//!
//! Uses work-stealing deques with two global lanes:
//! - Regular lane: fetches started by `ensure_loaded`
//! - Idle lane: prefetch batches, consulted only when nothing else is queued
//!
//! A worker drains its own deque, then the regular injector, then steals from
//! siblings. Only when all of those come up empty does it touch the idle lane.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::{trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::traits::{Job, TaskPool};

/// Worker pool with a regular lane and an idle lane.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4);
///
/// // Fetch right away
/// workers.execute(Box::new(move || { fetcher.fetch(&key); }));
///
/// // Prefetch once the pool has nothing better to do
/// workers.execute_idle(Box::new(move || { cache.ensure_loaded_batch(&keys); }));
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,      // Regular lane
    idle: Arc<Injector<Job>>,          // Idle lane
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    idle_lane: bool,
}

impl Workers {
    /// Create worker pool with `num_threads` threads.
    ///
    /// Recommended: `num_cpus::get() * 3 / 4` (see [`Workers::default_threads`]).
    pub fn new(num_threads: usize) -> Self {
        Self::with_idle_lane(num_threads, true)
    }

    /// Pool whose `execute_idle` is plain regular work (no idle capability).
    pub fn without_idle_lane(num_threads: usize) -> Self {
        Self::with_idle_lane(num_threads, false)
    }

    /// With zero threads (or if every spawn fails) jobs run inline on the
    /// submitting thread.
    pub fn with_idle_lane(num_threads: usize, idle_lane: bool) -> Self {
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let idle: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers_local: Vec<Worker<Job>> = Vec::new();
        let mut stealers: Vec<Stealer<Job>> = Vec::new();
        let mut handles = Vec::new();

        for _ in 0..num_threads {
            let worker: Worker<Job> = Worker::new_fifo();
            stealers.push(worker.stealer());
            workers_local.push(worker);
        }

        for (worker_id, worker) in workers_local.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let idle = Arc::clone(&idle);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let spawned = thread::Builder::new()
                .name(format!("imgwarm-worker-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);

                    loop {
                        if let Some(job) = next_job(&worker, &injector, &stealers, &idle) {
                            job();
                            continue;
                        }

                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }

                        // Nothing queued: short sleep to avoid CPU spin
                        thread::sleep(Duration::from_millis(1));
                    }

                    trace!("Worker {} stopped", worker_id);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::error!("Failed to spawn worker thread {}: {}", worker_id, e),
            }
        }

        if handles.is_empty() {
            warn!("No worker threads running, jobs will run inline");
        }
        trace!("Workers initialized: {} threads (idle lane: {})", handles.len(), idle_lane);

        Self {
            injector,
            idle,
            handles,
            shutdown,
            idle_lane,
        }
    }

    /// 75% of CPU cores, at least one.
    pub fn default_threads() -> usize {
        (num_cpus::get() * 3 / 4).max(1)
    }

    /// Number of running worker threads
    pub fn threads(&self) -> usize {
        self.handles.len()
    }
}

/// Pick the next job in priority order: own deque, regular lane, siblings, idle lane.
fn next_job(
    worker: &Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
    idle: &Injector<Job>,
) -> Option<Job> {
    if let Some(job) = worker.pop() {
        return Some(job);
    }

    if let Some(job) = injector.steal().success() {
        return Some(job);
    }

    for stealer in stealers {
        if let Some(job) = stealer.steal().success() {
            return Some(job);
        }
    }

    idle.steal().success()
}

impl TaskPool for Workers {
    fn execute(&self, job: Job) {
        if self.handles.is_empty() {
            job();
        } else {
            self.injector.push(job);
        }
    }

    fn execute_idle(&self, job: Job) {
        if self.supports_idle() {
            self.idle.push(job);
        } else {
            self.execute(job);
        }
    }

    fn supports_idle(&self) -> bool {
        self.idle_lane && !self.handles.is_empty()
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);

        // 500ms total for all threads; stragglers die with the process
        let deadline = Instant::now() + Duration::from_millis(500);

        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, exiting anyway");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped", num_threads);
    }
}
