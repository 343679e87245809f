//! Core preload engine - cache, completions, fetch/schedule boundaries, workers
//!
//! These modules are independent of the CLI.

pub mod completion;
pub mod fetcher;
pub mod preload;
pub mod scheduler;
pub mod traits;
pub mod workers;

// Re-exports for convenience
pub use completion::{Completion, Flight};
pub use fetcher::{ImageFetcher, LoadError, LoadMode};
pub use preload::{KeyState, LOOKAHEAD, PreloadCache, PreloadStatsSnapshot, upcoming_window};
pub use scheduler::{DelayScheduler, IdleScheduler, SchedulingMode, select_scheduler};
pub use traits::{FetchOutcome, Fetcher, Job, Scheduler, TaskPool};
pub use workers::Workers;
