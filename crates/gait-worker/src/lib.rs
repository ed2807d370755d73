//! Pose-analysis job worker.
//!
//! This crate provides:
//! - Job executor: admission, FIFO dispatch onto a bounded worker pool
//! - The per-job pipeline from trim to finalize
//! - Resource governance: scoped job workspaces, memory relief, TTL sweep
//! - Cooperative cancellation and graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod governor;
pub mod logging;
pub mod metrics;
pub mod processor;

#[cfg(test)]
pub(crate) mod testing;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use governor::{JobWorkspace, MemoryProbe, ResourceGovernor, SysinfoMemoryProbe};
pub use logging::JobLogger;
pub use processor::{process_job, JobOutcome, ProcessingContext};
