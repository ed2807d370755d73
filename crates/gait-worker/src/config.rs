//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gait_queue::AdmissionConfig;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs (worker slots)
    pub max_concurrent_jobs: usize,
    /// Maximum admitted jobs waiting for a slot
    pub max_pending_jobs: usize,
    /// Work directory; every job gets a subdirectory named after its id
    pub work_dir: PathBuf,
    /// Frames decoded and analysed per batch
    pub batch_size: usize,
    /// Process memory that triggers a relief pass
    pub memory_warn_mb: u64,
    /// Process memory above which submissions are refused
    pub memory_reject_mb: u64,
    /// Retention of terminal jobs before the sweep removes them
    pub job_max_age: Duration,
    /// How often the sweep runs
    pub sweep_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Videos taller than this are downscaled before analysis
    pub max_resolution: u32,
    /// Optional cap on the analysed clip length
    pub trim_max_secs: Option<f64>,
    /// Length of the preview clip
    pub preview_secs: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_pending_jobs: 10,
            work_dir: PathBuf::from("/tmp/gait"),
            batch_size: 30,
            memory_warn_mb: 2048,
            memory_reject_mb: 3072,
            job_max_age: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            max_resolution: 720,
            trim_max_secs: None,
            preview_secs: 3.0,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_or("WORKER_MAX_JOBS", defaults.max_concurrent_jobs),
            max_pending_jobs: env_or("WORKER_MAX_PENDING", defaults.max_pending_jobs),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            batch_size: env_or("WORKER_BATCH_SIZE", defaults.batch_size),
            memory_warn_mb: env_or("WORKER_MEMORY_WARN_MB", defaults.memory_warn_mb),
            memory_reject_mb: env_or("WORKER_MEMORY_REJECT_MB", defaults.memory_reject_mb),
            job_max_age: Duration::from_secs(env_or("WORKER_JOB_MAX_AGE_SECS", 3600)),
            sweep_interval: Duration::from_secs(env_or("WORKER_SWEEP_INTERVAL_SECS", 60)),
            shutdown_timeout: Duration::from_secs(env_or("WORKER_SHUTDOWN_TIMEOUT", 30)),
            max_resolution: env_or("WORKER_MAX_RESOLUTION", defaults.max_resolution),
            trim_max_secs: std::env::var("WORKER_TRIM_MAX_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            preview_secs: env_or("WORKER_PREVIEW_SECS", defaults.preview_secs),
        }
    }

    pub fn validate(&self) -> WorkerResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(WorkerError::config_error("WORKER_MAX_JOBS must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(WorkerError::config_error("WORKER_BATCH_SIZE must be at least 1"));
        }
        if self.sweep_interval.is_zero() {
            return Err(WorkerError::config_error(
                "WORKER_SWEEP_INTERVAL_SECS must be at least 1",
            ));
        }
        if self.memory_warn_mb > self.memory_reject_mb {
            return Err(WorkerError::config_error(format!(
                "memory warn threshold ({} MB) exceeds reject threshold ({} MB)",
                self.memory_warn_mb, self.memory_reject_mb
            )));
        }
        Ok(())
    }

    pub fn admission(&self) -> AdmissionConfig {
        AdmissionConfig {
            work_dir: self.work_dir.clone(),
            memory_warn_mb: self.memory_warn_mb,
            memory_reject_mb: self.memory_reject_mb,
        }
    }
}
