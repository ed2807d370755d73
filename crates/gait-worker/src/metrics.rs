//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use gait_models::{Bucket, Stage};
use gait_queue::RejectReason;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    // Admission
    pub const JOBS_ADMITTED_TOTAL: &str = "gait_jobs_admitted_total";
    pub const JOBS_REJECTED_TOTAL: &str = "gait_jobs_rejected_total";
    pub const PENDING_JOBS: &str = "gait_pending_jobs";

    // Job outcomes
    pub const JOBS_COMPLETED_TOTAL: &str = "gait_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "gait_jobs_failed_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "gait_jobs_cancelled_total";
    pub const STAGE_DURATION_SECONDS: &str = "gait_stage_duration_seconds";

    // Pose selection
    pub const FRAMES_PROCESSED_TOTAL: &str = "gait_frames_processed_total";
    pub const STRATEGIES_ATTEMPTED_TOTAL: &str = "gait_strategies_attempted_total";
    pub const LANDMARKS_INTERPOLATED_TOTAL: &str = "gait_landmarks_interpolated_total";

    // Resources
    pub const PROCESS_MEMORY_MB: &str = "gait_process_memory_mb";
    pub const JOBS_SWEPT_TOTAL: &str = "gait_jobs_swept_total";
}

pub fn record_admitted() {
    counter!(names::JOBS_ADMITTED_TOTAL).increment(1);
}

pub fn record_rejected(reason: RejectReason) {
    let labels = [("reason", reason.as_str().to_string())];
    counter!(names::JOBS_REJECTED_TOTAL, &labels).increment(1);
}

pub fn set_pending_jobs(count: usize) {
    gauge!(names::PENDING_JOBS).set(count as f64);
}

pub fn record_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

/// Record a failed job. `stage` is None for failures outside the pipeline.
pub fn record_failed(stage: Option<Stage>) {
    let stage = stage.map(|s| s.as_str()).unwrap_or("none");
    let labels = [("stage", stage.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_cancelled() {
    counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
}

pub fn record_stage_duration(stage: Stage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_frames_processed(count: u64) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(count);
}

pub fn record_strategies_attempted(bucket: Bucket, count: u64) {
    let labels = [("bucket", bucket.as_str().to_string())];
    counter!(names::STRATEGIES_ATTEMPTED_TOTAL, &labels).increment(count);
}

pub fn record_interpolated(count: u64) {
    counter!(names::LANDMARKS_INTERPOLATED_TOTAL).increment(count);
}

pub fn set_process_memory(mb: u64) {
    gauge!(names::PROCESS_MEMORY_MB).set(mb as f64);
}

pub fn record_swept(count: usize) {
    counter!(names::JOBS_SWEPT_TOTAL).increment(count as u64);
}
