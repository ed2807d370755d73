//! Pose-analysis worker binary.
//!
//! Submits every video path given on the command line, processes them and
//! prints the final job snapshots as JSON lines.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gait_media::{check_ffmpeg, check_ffprobe, FfmpegVideoIo};
use gait_ml_client::{PoseClient, RemoteDetectorFactory};
use gait_pose::PoseConfig;
use gait_worker::{metrics, JobExecutor, SysinfoMemoryProbe, WorkerConfig};

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("gait=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting gait-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);
    let pose_config = PoseConfig::from_env().context("loading pose config")?;

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("parsing METRICS_ADDR")?;
        metrics::init_metrics(addr).context("installing Prometheus exporter")?;
        info!(%addr, "Metrics exporter listening");
    }

    check_ffmpeg()?;
    check_ffprobe()?;

    let client = Arc::new(PoseClient::from_env()?);
    if !client.health_check().await? {
        warn!("Pose service is not healthy; detections will be retried per request");
    }

    let executor = Arc::new(JobExecutor::new(
        config,
        pose_config,
        Arc::new(FfmpegVideoIo::new()),
        Arc::new(RemoteDetectorFactory::new(client)),
        Arc::new(SysinfoMemoryProbe::new()),
    )?);

    let runner = tokio::spawn({
        let executor = Arc::clone(&executor);
        async move { executor.run().await }
    });

    let mut submitted = Vec::new();
    for path in std::env::args().skip(1) {
        match executor.submit(&path).await {
            Ok(job_id) => {
                info!(job_id = %job_id, input = %path, "Submitted");
                submitted.push(job_id);
            }
            Err(e) => error!(input = %path, "Submission rejected: {}", e),
        }
    }

    tokio::select! {
        _ = executor.wait_until_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    for job_id in &submitted {
        if let Some(job) = executor.status(job_id) {
            println!("{}", serde_json::to_string(&job)?);
        }
    }

    executor.shutdown();
    runner.await??;

    info!("Worker shutdown complete");
    Ok(())
}
