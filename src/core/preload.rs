//! Preload cache with in-flight deduplication
//!
//! State: `IndexSet<String>` of loaded keys + `HashMap<String, Arc<Flight>>`
//! of fetches in progress, both behind one mutex.
//!
//! Per-key lifecycle:
//! - `Unseen -> InFlight -> Loaded` when the fetch succeeds
//! - `Unseen -> InFlight -> Unseen` when it fails (failures are not
//!   remembered; the next request fetches again)
//!
//! Callers never see errors. A completion only says "the attempt is over".

use indexmap::IndexSet;
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::completion::{Completion, Flight};
use super::traits::{FetchOutcome, Fetcher, Scheduler, TaskPool};

/// Look-ahead window width for `prefetch_upcoming`
pub const LOOKAHEAD: usize = 3;

/// Observable state of a single key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Unseen,
    InFlight,
    Loaded,
}

/// Counters for monitoring
#[derive(Debug, Default)]
pub struct PreloadStats {
    hits: AtomicU64,
    joins: AtomicU64,
    fetches: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl PreloadStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_join(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Loaded => self.successes.fetch_add(1, Ordering::Relaxed),
            FetchOutcome::Failed => self.failures.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> PreloadStatsSnapshot {
        PreloadStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PreloadStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadStatsSnapshot {
    /// Requests answered from the loaded set
    pub hits: u64,
    /// Requests that joined a fetch already in flight
    pub joins: u64,
    /// Fetches started
    pub fetches: u64,
    pub successes: u64,
    pub failures: u64,
}

impl PreloadStatsSnapshot {
    /// Share of requests that did not start a fetch
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.joins + self.fetches;
        if total == 0 { 0.0 } else { (self.hits + self.joins) as f64 / total as f64 }
    }
}

#[derive(Debug, Default)]
struct State {
    loaded: IndexSet<String>,
    in_flight: HashMap<String, Arc<Flight>>,
}

struct Inner {
    state: Mutex<State>,
    fetcher: Arc<dyn Fetcher>,
    pool: Arc<dyn TaskPool>,
    scheduler: Arc<dyn Scheduler>,
    stats: PreloadStats,
    lookahead: usize,
    critical_scheduled: AtomicBool,
}

/// Best-effort image preload cache.
///
/// Cheap to clone; clones share state. Construct one per application (or
/// per test) and pass it to whoever needs images warmed.
#[derive(Clone)]
pub struct PreloadCache {
    inner: Arc<Inner>,
}

impl PreloadCache {
    /// Create cache over the given boundaries.
    ///
    /// # Arguments
    /// * `fetcher` - Loads one resource, reports loaded / failed
    /// * `pool` - Runs fetches off the caller's thread
    /// * `scheduler` - Runs prefetch batches at low priority
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        pool: Arc<dyn TaskPool>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        info!("PreloadCache created: scheduler={}", scheduler.name());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                fetcher,
                pool,
                scheduler,
                stats: PreloadStats::new(),
                lookahead: LOOKAHEAD,
                critical_scheduled: AtomicBool::new(false),
            }),
        }
    }

    /// Override the look-ahead window width (must be called before sharing).
    pub fn with_lookahead(self, lookahead: usize) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                info!("PreloadCache lookahead: {} -> {}", inner.lookahead, lookahead);
                inner.lookahead = lookahead;
                Self { inner: Arc::new(inner) }
            }
            Err(inner) => {
                warn!("PreloadCache already shared, keeping lookahead={}", inner.lookahead);
                Self { inner }
            }
        }
    }

    /// Make sure `key` is loaded or being loaded.
    ///
    /// - Loaded: returns [`Completion::Ready`], no I/O
    /// - In flight: returns a completion sharing the running fetch
    /// - Otherwise: starts a fetch on the pool
    pub fn ensure_loaded(&self, key: &str) -> Completion {
        let flight = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());

            if state.loaded.contains(key) {
                self.inner.stats.record_hit();
                return Completion::Ready;
            }

            if let Some(existing) = state.in_flight.get(key) {
                self.inner.stats.record_join();
                trace!("Joined in-flight fetch: {}", key);
                return Completion::Pending(Arc::clone(existing));
            }

            let flight = Arc::new(Flight::new());
            state.in_flight.insert(key.to_string(), Arc::clone(&flight));
            flight
        }; // state lock released before the fetch is submitted

        self.inner.stats.record_fetch();
        trace!("Fetch started: {}", key);

        let inner = Arc::clone(&self.inner);
        let job_key = key.to_string();
        let job_flight = Arc::clone(&flight);
        self.inner
            .pool
            .execute(Box::new(move || inner.run_fetch(&job_key, &job_flight)));

        Completion::Pending(flight)
    }

    /// `ensure_loaded` every key; the result completes when all of them do.
    pub fn ensure_loaded_batch<I, S>(&self, keys: I) -> Completion
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parts: Vec<Completion> = keys
            .into_iter()
            .map(|key| self.ensure_loaded(key.as_ref()))
            .filter(|part| !matches!(part, Completion::Ready))
            .collect();

        if parts.is_empty() {
            Completion::Ready
        } else {
            Completion::All(parts)
        }
    }

    /// Whether `key` has been loaded successfully at least once.
    pub fn is_loaded(&self, key: &str) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .loaded
            .contains(key)
    }

    /// Whether a fetch for `key` is currently running.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .in_flight
            .contains_key(key)
    }

    pub fn key_state(&self, key: &str) -> KeyState {
        let state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.loaded.contains(key) {
            KeyState::Loaded
        } else if state.in_flight.contains_key(key) {
            KeyState::InFlight
        } else {
            KeyState::Unseen
        }
    }

    /// Prefetch the items right after `current` at low priority.
    ///
    /// Fire-and-forget: nothing is returned and failures stay silent.
    pub fn prefetch_upcoming<S: AsRef<str>>(&self, current: usize, items: &[Option<S>]) {
        let keys: Vec<String> = upcoming_window(current, items, self.inner.lookahead)
            .into_iter()
            .map(str::to_string)
            .collect();

        if keys.is_empty() {
            return;
        }

        trace!("Prefetch upcoming after {}: {:?}", current, keys);
        self.schedule_batch(keys);
    }

    /// Warm a fixed list of always-needed images in the background.
    ///
    /// Only the first call per cache schedules anything; returns whether
    /// this call did.
    pub fn prefetch_critical(&self, keys: &[String]) -> bool {
        if self.inner.critical_scheduled.swap(true, Ordering::SeqCst) {
            debug!("Critical prefetch already scheduled, ignoring");
            return false;
        }

        if !keys.is_empty() {
            info!("Scheduling critical prefetch: {} images", keys.len());
            self.schedule_batch(keys.to_vec());
        }
        true
    }

    fn schedule_batch(&self, keys: Vec<String>) {
        let cache = self.clone();
        self.inner.scheduler.schedule(Box::new(move || {
            // Nobody waits on prefetch batches
            let _ = cache.ensure_loaded_batch(&keys);
        }));
    }

    /// Number of loaded keys
    pub fn loaded_count(&self) -> usize {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).loaded.len()
    }

    /// Number of fetches in progress
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).in_flight.len()
    }

    /// Loaded keys in the order they finished loading
    pub fn loaded_keys(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .loaded
            .iter()
            .cloned()
            .collect()
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> PreloadStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl Inner {
    /// Runs on a pool thread: fetch, record, release waiters.
    fn run_fetch(&self, key: &str, flight: &Arc<Flight>) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.fetcher.fetch(key))).unwrap_or_else(|_| {
            warn!("Fetcher panicked for {}, treating as failure", key);
            FetchOutcome::Failed
        });

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if outcome.is_loaded() {
                state.loaded.insert(key.to_string());
            }
            state.in_flight.remove(key);
        }

        self.stats.record_outcome(outcome);
        debug!("Fetch finished: {} ({:?})", key, outcome);

        flight.finish();
    }
}

/// Keys at positions `current+1 ..= current+lookahead` that exist and have a key.
pub fn upcoming_window<S: AsRef<str>>(current: usize, items: &[Option<S>], lookahead: usize) -> Vec<&str> {
    let start = current.saturating_add(1).min(items.len());
    let end = start.saturating_add(lookahead).min(items.len());

    items[start..end]
        .iter()
        .filter_map(|item| item.as_ref().map(|key| key.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::Job;
    use crate::core::workers::Workers;
    use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
    use std::thread;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Counts calls per key. Keys containing "bad" fail; others load.
    /// With a gate, every fetch blocks until the gate sender is dropped.
    #[derive(Default)]
    struct ScriptedFetcher {
        calls: Mutex<HashMap<String, usize>>,
        gate: Option<Receiver<()>>,
    }

    impl ScriptedFetcher {
        fn gated() -> (Arc<Self>, Sender<()>) {
            let (tx, rx) = bounded(0);
            let fetcher = Self {
                calls: Mutex::new(HashMap::new()),
                gate: Some(rx),
            };
            (Arc::new(fetcher), tx)
        }

        fn calls(&self, key: &str) -> usize {
            self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
        }
    }

    impl Fetcher for ScriptedFetcher {
        fn fetch(&self, key: &str) -> FetchOutcome {
            *self.calls.lock().unwrap().entry(key.to_string()).or_default() += 1;
            if let Some(gate) = &self.gate {
                // Blocks until the sender is dropped
                let _ = gate.recv();
            }
            if key.contains("bad") {
                FetchOutcome::Failed
            } else {
                FetchOutcome::Loaded
            }
        }
    }

    struct PanickingFetcher;

    impl Fetcher for PanickingFetcher {
        fn fetch(&self, _key: &str) -> FetchOutcome {
            panic!("boom");
        }
    }

    /// Runs every job on the calling thread.
    struct InlinePool;

    impl TaskPool for InlinePool {
        fn execute(&self, job: Job) {
            job();
        }
    }

    /// Collects scheduled jobs so tests decide when they run.
    #[derive(Default)]
    struct ManualScheduler {
        jobs: Mutex<Vec<Job>>,
    }

    impl ManualScheduler {
        fn pending(&self) -> usize {
            self.jobs.lock().unwrap().len()
        }

        fn run_all(&self) {
            let jobs: Vec<Job> = std::mem::take(&mut *self.jobs.lock().unwrap());
            for job in jobs {
                job();
            }
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule(&self, job: Job) {
            self.jobs.lock().unwrap().push(job);
        }

        fn name(&self) -> &'static str {
            "manual"
        }
    }

    fn inline_cache(fetcher: Arc<ScriptedFetcher>) -> (PreloadCache, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::default());
        let cache = PreloadCache::new(fetcher, Arc::new(InlinePool), scheduler.clone());
        (cache, scheduler)
    }

    fn threaded_cache(fetcher: Arc<ScriptedFetcher>) -> PreloadCache {
        PreloadCache::new(
            fetcher,
            Arc::new(Workers::new(2)),
            Arc::new(ManualScheduler::default()),
        )
    }

    #[test]
    fn test_success_is_idempotent() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let (cache, _) = inline_cache(Arc::clone(&fetcher));

        assert_eq!(cache.key_state("img://a"), KeyState::Unseen);
        cache.ensure_loaded("img://a").wait();
        assert!(cache.is_loaded("img://a"));
        assert_eq!(cache.key_state("img://a"), KeyState::Loaded);

        // Fast path: no new fetch
        let again = cache.ensure_loaded("img://a");
        assert!(matches!(again, Completion::Ready));
        assert_eq!(fetcher.calls("img://a"), 1);

        let stats = cache.stats();
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_concurrent_requests_share_one_fetch() {
        let (fetcher, gate) = ScriptedFetcher::gated();
        let cache = threaded_cache(Arc::clone(&fetcher));

        let completions: Vec<Completion> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| cache.ensure_loaded("img://a")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // Nobody is done while the fetch is blocked
        assert!(completions.iter().all(|c| !c.is_done()));
        assert!(completions.iter().all(|c| c.shares_flight(&completions[0])));
        assert_eq!(cache.key_state("img://a"), KeyState::InFlight);
        assert_eq!(cache.in_flight_count(), 1);

        drop(gate);
        for completion in &completions {
            assert!(completion.wait_timeout(TIMEOUT));
        }

        assert_eq!(fetcher.calls("img://a"), 1);
        assert!(cache.is_loaded("img://a"));
        assert_eq!(cache.in_flight_count(), 0);
        assert_eq!(cache.stats().joins, 7);
    }

    #[test]
    fn test_back_to_back_calls_share_completion() {
        let (fetcher, gate) = ScriptedFetcher::gated();
        let cache = threaded_cache(Arc::clone(&fetcher));

        let first = cache.ensure_loaded("img://a");
        let second = cache.ensure_loaded("img://a");
        assert!(first.shares_flight(&second));

        drop(gate);
        assert!(second.wait_timeout(TIMEOUT));
        assert!(first.is_done());
        assert!(cache.is_loaded("img://a"));
    }

    #[test]
    fn test_failure_is_not_sticky() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let (cache, _) = inline_cache(Arc::clone(&fetcher));

        let completion = cache.ensure_loaded("img://bad");
        completion.wait();
        assert!(completion.is_done());
        assert!(!cache.is_loaded("img://bad"));
        assert_eq!(cache.key_state("img://bad"), KeyState::Unseen);

        // Second call is a brand-new attempt
        let retry = cache.ensure_loaded("img://bad");
        assert!(!matches!(retry, Completion::Ready));
        retry.wait();
        assert_eq!(fetcher.calls("img://bad"), 2);
        assert!(!cache.is_loaded("img://bad"));
        assert_eq!(cache.stats().failures, 2);
    }

    #[test]
    fn test_failed_fetch_wakes_waiters() {
        let (fetcher, gate) = ScriptedFetcher::gated();
        let cache = threaded_cache(Arc::clone(&fetcher));

        let a = cache.ensure_loaded("img://bad");
        let b = cache.ensure_loaded("img://bad");
        drop(gate);

        assert!(a.wait_timeout(TIMEOUT));
        assert!(b.wait_timeout(TIMEOUT));
        assert!(!cache.is_loaded("img://bad"));
        assert!(!cache.is_in_flight("img://bad"));
        assert_eq!(fetcher.calls("img://bad"), 1);
    }

    #[test]
    fn test_batch_is_join_barrier() {
        let (fetcher, gate) = ScriptedFetcher::gated();
        let cache = threaded_cache(Arc::clone(&fetcher));

        let batch = cache.ensure_loaded_batch(["img://a", "img://b", "img://bad", "img://a"]);
        assert!(!batch.is_done());

        drop(gate);
        assert!(batch.wait_timeout(TIMEOUT));

        assert!(cache.is_loaded("img://a"));
        assert!(cache.is_loaded("img://b"));
        assert!(!cache.is_loaded("img://bad"));
        assert_eq!(fetcher.calls("img://a"), 1);
        assert_eq!(fetcher.calls("img://b"), 1);
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[test]
    fn test_batch_of_loaded_keys_is_ready() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let (cache, _) = inline_cache(fetcher);

        cache.ensure_loaded("img://a").wait();
        assert!(matches!(cache.ensure_loaded_batch(["img://a"]), Completion::Ready));
        assert!(matches!(cache.ensure_loaded_batch(Vec::<String>::new()), Completion::Ready));
    }

    #[test]
    fn test_upcoming_window() {
        let items = vec![Some("a"), Some("b"), None, Some("d"), Some("e"), Some("f")];

        assert_eq!(upcoming_window(0, &items, LOOKAHEAD), vec!["b", "d"]);
        assert_eq!(upcoming_window(2, &items, LOOKAHEAD), vec!["d", "e", "f"]);
        assert_eq!(upcoming_window(4, &items, LOOKAHEAD), vec!["f"]);
        assert!(upcoming_window(5, &items, LOOKAHEAD).is_empty());
        assert!(upcoming_window(100, &items, LOOKAHEAD).is_empty());

        // Length 4, position 2: only position 3 is eligible
        let short = vec![Some("p0"), Some("p1"), Some("p2"), Some("p3")];
        assert_eq!(upcoming_window(2, &short, LOOKAHEAD), vec!["p3"]);
    }

    #[test]
    fn test_prefetch_upcoming_is_scheduled_not_immediate() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let (cache, scheduler) = inline_cache(Arc::clone(&fetcher));
        let items = vec![Some("img://0"), Some("img://1"), None, Some("img://bad"), Some("img://4")];

        cache.prefetch_upcoming(0, &items);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(fetcher.calls("img://1"), 0);

        scheduler.run_all();
        assert!(cache.is_loaded("img://1"));
        assert!(!cache.is_loaded("img://bad"));
        assert!(!cache.is_loaded("img://4"));
        assert_eq!(fetcher.calls("img://bad"), 1);
    }

    #[test]
    fn test_prefetch_upcoming_empty_window_schedules_nothing() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let (cache, scheduler) = inline_cache(fetcher);

        cache.prefetch_upcoming(0, &[Some("img://0"), None, None, None, Some("img://4")]);
        cache.prefetch_upcoming(4, &[Some("img://0"), None, None, None, Some("img://4")]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_custom_lookahead() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let (cache, scheduler) = inline_cache(fetcher);
        let cache = cache.with_lookahead(1);

        cache.prefetch_upcoming(0, &[Some("img://0"), Some("img://1"), Some("img://2")]);
        scheduler.run_all();
        assert_eq!(cache.loaded_keys(), vec!["img://1".to_string()]);
    }

    #[test]
    fn test_prefetch_critical_runs_once() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let (cache, scheduler) = inline_cache(Arc::clone(&fetcher));
        let critical = vec!["img://logo".to_string(), "img://spinner".to_string()];

        assert!(cache.prefetch_critical(&critical));
        assert!(!cache.prefetch_critical(&critical));
        assert_eq!(scheduler.pending(), 1);

        scheduler.run_all();
        assert_eq!(cache.loaded_keys(), critical);
        assert_eq!(fetcher.calls("img://logo"), 1);
    }

    #[test]
    fn test_panicking_fetcher_counts_as_failure() {
        let cache = PreloadCache::new(
            Arc::new(PanickingFetcher),
            Arc::new(InlinePool),
            Arc::new(ManualScheduler::default()),
        );

        let completion = cache.ensure_loaded("img://a");
        assert!(completion.is_done());
        assert_eq!(cache.key_state("img://a"), KeyState::Unseen);
        assert_eq!(cache.stats().failures, 1);
    }

    #[test]
    fn test_keys_are_not_normalized() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let (cache, _) = inline_cache(Arc::clone(&fetcher));

        cache.ensure_loaded("img://a").wait();
        cache.ensure_loaded("img://a?v=2").wait();
        assert_eq!(cache.loaded_count(), 2);
        assert_eq!(fetcher.calls("img://a?v=2"), 1);
    }

    #[test]
    fn test_idle_prefetch_on_real_pool() {
        let workers = Arc::new(Workers::new(2));
        let fetcher = Arc::new(ScriptedFetcher::default());
        let scheduler = crate::core::scheduler::select_scheduler(
            crate::core::scheduler::SchedulingMode::Auto,
            workers.clone(),
            10,
        );
        let cache = PreloadCache::new(fetcher, workers, scheduler);

        cache.prefetch_upcoming(0, &[Some("img://0"), Some("img://1"), Some("img://2")]);

        let (tx, rx) = unbounded();
        thread::spawn(move || {
            while cache.loaded_count() < 2 {
                thread::sleep(Duration::from_millis(1));
            }
            tx.send(cache.loaded_count()).ok();
        });
        assert_eq!(rx.recv_timeout(TIMEOUT), Ok(2));
    }

    #[test]
    fn test_delay_prefetch_on_real_pool() {
        let workers = Arc::new(Workers::without_idle_lane(2));
        let fetcher = Arc::new(ScriptedFetcher::default());
        let scheduler = crate::core::scheduler::select_scheduler(
            crate::core::scheduler::SchedulingMode::Auto,
            workers.clone(),
            200,
        );
        assert_eq!(scheduler.name(), "delay");
        let cache = PreloadCache::new(fetcher.clone(), workers, scheduler);

        cache.prefetch_upcoming(0, &[Some("img://0"), Some("img://1"), Some("img://2")]);
        assert!(cache.prefetch_critical(&["img://crit".to_string()]));

        // Nothing starts before the delay elapses
        thread::sleep(Duration::from_millis(20));
        assert_eq!(fetcher.calls("img://1"), 0);
        assert_eq!(fetcher.calls("img://crit"), 0);
        assert_eq!(cache.key_state("img://1"), KeyState::Unseen);

        let (tx, rx) = unbounded();
        let waiter = cache.clone();
        thread::spawn(move || {
            while waiter.loaded_count() < 3 {
                thread::sleep(Duration::from_millis(1));
            }
            tx.send(waiter.loaded_count()).ok();
        });
        assert_eq!(rx.recv_timeout(TIMEOUT), Ok(3));

        assert_eq!(cache.key_state("img://1"), KeyState::Loaded);
        assert_eq!(cache.key_state("img://2"), KeyState::Loaded);
        assert_eq!(cache.key_state("img://crit"), KeyState::Loaded);
        assert_eq!(cache.key_state("img://0"), KeyState::Unseen);
        assert_eq!(fetcher.calls("img://1"), 1);
    }

    #[test]
    fn test_zero_thread_pool_still_loads() {
        let workers = Arc::new(Workers::new(0));
        let fetcher = Arc::new(ScriptedFetcher::default());
        let scheduler = crate::core::scheduler::select_scheduler(
            crate::core::scheduler::SchedulingMode::Auto,
            workers.clone(),
            5,
        );
        assert_eq!(scheduler.name(), "delay");
        let cache = PreloadCache::new(fetcher, workers, scheduler);

        // Inline pool: the fetch finished before ensure_loaded returned
        let completion = cache.ensure_loaded("img://x");
        assert!(completion.wait_timeout(TIMEOUT));
        assert_eq!(cache.key_state("img://x"), KeyState::Loaded);

        cache.prefetch_upcoming(0, &[Some("img://0"), Some("img://1")]);
        let (tx, rx) = unbounded();
        let waiter = cache.clone();
        thread::spawn(move || {
            while !waiter.is_loaded("img://1") {
                thread::sleep(Duration::from_millis(1));
            }
            tx.send(()).ok();
        });
        assert_eq!(rx.recv_timeout(TIMEOUT), Ok(()));
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[test]
    fn test_hit_rate() {
        let snapshot = PreloadStatsSnapshot { hits: 2, joins: 1, fetches: 1, ..Default::default() };
        assert_eq!(snapshot.hit_rate(), 0.75);
        assert_eq!(PreloadStatsSnapshot::default().hit_rate(), 0.0);
    }
}
