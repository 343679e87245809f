//! Completion signals handed out by the preload cache.
//!
//! A [`Flight`] is the shared "attempt is over" flag for one in-flight fetch.
//! Every caller that asks for the same key while the fetch runs receives a
//! [`Completion`] pointing at the same flight, so they all wake together.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Shared completion flag for one fetch attempt.
#[derive(Debug, Default)]
pub struct Flight {
    done: Mutex<bool>,
    cv: Condvar,
}

impl Flight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the attempt as over and wake every waiter. Idempotent.
    pub fn finish(&self) {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        *done = true;
        self.cv.notify_all();
    }

    pub fn is_done(&self) -> bool {
        *self.done.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        while !*done {
            done = self.cv.wait(done).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Wait until `deadline`. Returns true if the attempt finished in time.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(done, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            done = guard;
        }
        true
    }
}

/// What `ensure_loaded` and friends return.
///
/// Carries no success/failure information: completion only means the
/// attempt is over.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Nothing to wait for (key already loaded, or empty batch)
    Ready,
    /// Shares an in-flight fetch
    Pending(Arc<Flight>),
    /// Join barrier over several completions
    All(Vec<Completion>),
}

impl Completion {
    /// Block until the attempt (or every member of a batch) is over.
    pub fn wait(&self) {
        match self {
            Completion::Ready => {}
            Completion::Pending(flight) => flight.wait(),
            Completion::All(parts) => parts.iter().for_each(Completion::wait),
        }
    }

    /// Block at most `timeout`. Returns true if everything finished.
    ///
    /// Giving up does not touch cache state: the fetch keeps running and
    /// its key stays in flight until it returns.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        match self {
            Completion::Ready => true,
            Completion::Pending(flight) => flight.wait_until(deadline),
            Completion::All(parts) => parts.iter().all(|part| part.wait_until(deadline)),
        }
    }

    /// Non-blocking check.
    pub fn is_done(&self) -> bool {
        match self {
            Completion::Ready => true,
            Completion::Pending(flight) => flight.is_done(),
            Completion::All(parts) => parts.iter().all(Completion::is_done),
        }
    }

    /// True when both completions wait on the very same fetch.
    pub fn shares_flight(&self, other: &Completion) -> bool {
        match (self, other) {
            (Completion::Pending(a), Completion::Pending(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
