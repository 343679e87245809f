//! IMGWARM - best-effort image preloading library
//!
//! Re-exports all modules for use by the binary target.

// Core engine (cache, completions, boundaries, workers)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod utils;

// Re-export commonly used types from core
pub use crate::core::completion::Completion;
pub use crate::core::fetcher::{ImageFetcher, LoadMode};
pub use crate::core::preload::{KeyState, PreloadCache, PreloadStatsSnapshot};
pub use crate::core::scheduler::SchedulingMode;
pub use crate::core::traits::{FetchOutcome, Fetcher, Scheduler, TaskPool};
pub use crate::core::workers::Workers;
