//! In-memory job state and admission control.
//!
//! This crate provides:
//! - The job registry, the only shared mutable job state in the process
//! - A bounded FIFO pending queue that wakes the dispatcher
//! - Admission control against queue capacity and memory pressure

pub mod admission;
pub mod error;
pub mod queue;
pub mod registry;

pub use admission::{AdmissionConfig, AdmissionController, MemoryMonitor};
pub use error::{QueueError, QueueResult, RejectReason};
pub use queue::PendingQueue;
pub use registry::JobRegistry;
