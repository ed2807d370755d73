//! Video I/O seam used by the pipeline, with the FFmpeg implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbImage;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// Width of the thumbnail image.
pub const THUMBNAIL_WIDTH: u32 = 480;
/// Width of the preview clip.
pub const PREVIEW_WIDTH: u32 = 320;
/// Pattern of numbered frame files written and read by this module.
pub const FRAME_PATTERN: &str = "frame_%06d.png";

/// A contiguous range of frames, by zero-based index, of a video running
/// at `fps`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBatch {
    pub start: usize,
    pub count: usize,
    pub fps: f64,
}

impl FrameBatch {
    pub fn new(start: usize, count: usize, fps: f64) -> Self {
        Self { start, count, fps }
    }

    /// Inclusive index of the last frame in the batch.
    pub fn end(&self) -> usize {
        self.start + self.count.saturating_sub(1)
    }

    /// Input seek landing on frame `start`. Half a frame early, so the
    /// accurate seek keeps the first frame despite timestamp rounding.
    /// None for the first batch or an unknown frame rate.
    fn seek_secs(&self) -> Option<f64> {
        (self.start > 0 && self.fps > 0.0).then(|| (self.start as f64 - 0.5) / self.fps)
    }
}

/// File name of frame `index` under [`FRAME_PATTERN`].
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{:06}.png", index)
}

/// Video operations the pipeline needs.
#[async_trait]
pub trait VideoIo: Send + Sync {
    async fn probe(&self, video: &Path) -> MediaResult<VideoInfo>;

    /// Normalise the upload to H.264 without audio, optionally capped to `max_secs`.
    async fn trim(
        &self,
        input: &Path,
        output: &Path,
        max_secs: Option<f64>,
        cancel: &CancellationToken,
    ) -> MediaResult<()>;

    /// Downscale to `max_height`, keeping aspect ratio.
    async fn reduce_resolution(
        &self,
        input: &Path,
        output: &Path,
        max_height: u32,
        cancel: &CancellationToken,
    ) -> MediaResult<()>;

    /// Decode one batch of frames. Returns fewer than `batch.count` frames
    /// at the end of the video. `scratch` is used for intermediate files and
    /// left empty on return.
    async fn extract_frames(
        &self,
        video: &Path,
        batch: FrameBatch,
        scratch: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<Vec<RgbImage>>;

    /// Encode `frames_dir/frame_%06d.png` into a video.
    async fn encode_frames(
        &self,
        frames_dir: &Path,
        fps: f64,
        output: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<()>;

    async fn generate_thumbnail(&self, video: &Path, output: &Path) -> MediaResult<()>;

    /// Downscaled clip of the first `secs` seconds.
    async fn generate_preview(&self, video: &Path, output: &Path, secs: f64) -> MediaResult<()>;
}

/// [`VideoIo`] backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegVideoIo {
    timeout_secs: Option<u64>,
}

impl FfmpegVideoIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-command timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    fn runner(&self, cancel: Option<&CancellationToken>) -> FfmpegRunner {
        let mut runner = FfmpegRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        if let Some(token) = cancel {
            runner = runner.with_cancel(token.clone());
        }
        runner
    }
}

#[async_trait]
impl VideoIo for FfmpegVideoIo {
    async fn probe(&self, video: &Path) -> MediaResult<VideoInfo> {
        probe_video(video).await
    }

    async fn trim(
        &self,
        input: &Path,
        output: &Path,
        max_secs: Option<f64>,
        cancel: &CancellationToken,
    ) -> MediaResult<()> {
        let mut cmd = FfmpegCommand::new(input, output);
        if let Some(secs) = max_secs {
            cmd = cmd.duration(secs);
        }
        let cmd = cmd.h264().no_audio();
        self.runner(Some(cancel)).run(&cmd).await
    }

    async fn reduce_resolution(
        &self,
        input: &Path,
        output: &Path,
        max_height: u32,
        cancel: &CancellationToken,
    ) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(input, output)
            .video_filter(format!("scale=-2:{}", max_height))
            .h264()
            .no_audio();
        self.runner(Some(cancel)).run(&cmd).await
    }

    async fn extract_frames(
        &self,
        video: &Path,
        batch: FrameBatch,
        scratch: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<Vec<RgbImage>> {
        if batch.count == 0 {
            return Ok(Vec::new());
        }
        tokio::fs::create_dir_all(scratch).await?;

        let cmd = extract_command(video, scratch, batch);
        let run = self.runner(Some(cancel)).run(&cmd).await;

        let files = match run {
            Ok(()) => list_frame_files(scratch).await,
            Err(e) => Err(e),
        };
        let frames = match files {
            Ok(files) => load_frames(files).await,
            Err(e) => Err(e),
        };

        // The scratch dir holds only this batch; never leave it behind
        clear_dir(scratch).await?;

        let frames = frames?;
        debug!(
            start = batch.start,
            requested = batch.count,
            decoded = frames.len(),
            "Extracted frame batch"
        );
        Ok(frames)
    }

    async fn encode_frames(
        &self,
        frames_dir: &Path,
        fps: f64,
        output: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(frames_dir.join(FRAME_PATTERN), output)
            .input_frame_rate(fps)
            .input_arg("-start_number")
            .input_arg("0")
            // yuv420p needs even dimensions
            .video_filter("scale=trunc(iw/2)*2:trunc(ih/2)*2")
            .h264();
        self.runner(Some(cancel)).run(&cmd).await
    }

    async fn generate_thumbnail(&self, video: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(video, output)
            .single_frame()
            .video_filter(format!("scale={}:-2", THUMBNAIL_WIDTH));
        self.runner(None).run(&cmd).await
    }

    async fn generate_preview(&self, video: &Path, output: &Path, secs: f64) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(video, output)
            .duration(secs)
            .video_filter(format!("scale={}:-2", PREVIEW_WIDTH))
            .h264()
            .no_audio();
        self.runner(None).run(&cmd).await
    }
}

/// Decode only the batch: seek to its first frame and stop after `count`
/// frames. Without a usable frame rate, fall back to selecting by decode
/// index.
fn extract_command(video: &Path, scratch: &Path, batch: FrameBatch) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(video, scratch.join(FRAME_PATTERN));
    let cmd = match batch.seek_secs() {
        Some(secs) => cmd.seek(secs),
        None if batch.start > 0 => cmd.video_filter(select_filter(batch)),
        None => cmd,
    };
    cmd.output_args(["-fps_mode", "passthrough", "-start_number", "0"])
        .output_arg("-frames:v")
        .output_arg(batch.count.to_string())
}

/// `select` filter keeping frames `start..=end` by decode index.
fn select_filter(batch: FrameBatch) -> String {
    format!("select='between(n\\,{}\\,{})'", batch.start, batch.end())
}

/// Frame files in `dir`, in index order.
pub async fn list_frame_files(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_frame = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("frame_") && n.ends_with(".png"));
        if is_frame {
            files.push(path);
        }
    }
    // Zero-padded names sort in index order
    files.sort();
    Ok(files)
}

async fn load_frames(files: Vec<PathBuf>) -> MediaResult<Vec<RgbImage>> {
    tokio::task::spawn_blocking(move || {
        files
            .iter()
            .map(|path| Ok(image::open(path)?.to_rgb8()))
            .collect::<MediaResult<Vec<_>>>()
    })
    .await
    .map_err(|e| MediaError::internal(format!("frame decode task failed: {}", e)))?
}

async fn clear_dir(dir: &Path) -> MediaResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
