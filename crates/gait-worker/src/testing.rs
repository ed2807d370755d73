//! In-process fakes for the video and detector seams.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gait_media::{list_frame_files, FrameBatch, MediaError, MediaResult, VideoInfo, VideoIo};
use gait_models::landmark_ids::MIRROR_PAIRS;
use gait_models::{DetectorConfig, JobId, Landmark, LandmarkSet, LANDMARK_COUNT};
use gait_pose::{DetectorFactory, PoseDetector, PoseResult};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeState {
    resized: bool,
    extract_calls: usize,
    batches: Vec<FrameBatch>,
    encoded_frames: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// Serves `frames` synthetic 16x16 frames. Pixel (0, 0) carries the frame
/// index in its red channel.
pub struct FakeVideoIo {
    frames: usize,
    height: u32,
    fail_encode: bool,
    extract_delay: Duration,
    state: Mutex<FakeState>,
}

impl FakeVideoIo {
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            height: 480,
            fail_encode: false,
            extract_delay: Duration::ZERO,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    pub fn failing_encode(mut self) -> Self {
        self.fail_encode = true;
        self
    }

    pub fn with_extract_delay(mut self, delay: Duration) -> Self {
        self.extract_delay = delay;
        self
    }

    /// Cancel `token` while serving the `n`th extract call.
    pub fn cancel_after_batches(&self, n: usize, token: CancellationToken) {
        self.state.lock().cancel_after = Some((n, token));
    }

    pub fn resized(&self) -> bool {
        self.state.lock().resized
    }

    pub fn extract_calls(&self) -> usize {
        self.state.lock().extract_calls
    }

    /// Every batch requested from `extract_frames`, in call order.
    pub fn batches(&self) -> Vec<FrameBatch> {
        self.state.lock().batches.clone()
    }

    pub fn encoded_frames(&self) -> usize {
        self.state.lock().encoded_frames
    }
}

async fn touch(path: &Path) -> MediaResult<()> {
    tokio::fs::write(path, b"fake").await?;
    Ok(())
}

#[async_trait]
impl VideoIo for FakeVideoIo {
    async fn probe(&self, _video: &Path) -> MediaResult<VideoInfo> {
        let height = if self.resized() { self.height.min(720) } else { self.height };
        Ok(VideoInfo {
            duration: self.frames as f64 / 30.0,
            width: height * 16 / 9,
            height,
            fps: 30.0,
            frame_count: self.frames as u64,
            codec: "h264".to_string(),
        })
    }

    async fn trim(
        &self,
        _input: &Path,
        output: &Path,
        _max_secs: Option<f64>,
        cancel: &CancellationToken,
    ) -> MediaResult<()> {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        touch(output).await
    }

    async fn reduce_resolution(
        &self,
        _input: &Path,
        output: &Path,
        _max_height: u32,
        _cancel: &CancellationToken,
    ) -> MediaResult<()> {
        self.state.lock().resized = true;
        touch(output).await
    }

    async fn extract_frames(
        &self,
        _video: &Path,
        batch: FrameBatch,
        scratch: &Path,
        _cancel: &CancellationToken,
    ) -> MediaResult<Vec<RgbImage>> {
        if !self.extract_delay.is_zero() {
            tokio::time::sleep(self.extract_delay).await;
        }
        tokio::fs::create_dir_all(scratch).await?;
        tokio::fs::remove_dir_all(scratch).await?;

        let end = (batch.start + batch.count).min(self.frames);
        let frames = (batch.start..end)
            .map(|i| {
                let mut frame = RgbImage::from_pixel(16, 16, Rgb([40, 40, 40]));
                frame.put_pixel(0, 0, Rgb([(i % 256) as u8, 0, 0]));
                frame
            })
            .collect();

        let mut state = self.state.lock();
        state.extract_calls += 1;
        state.batches.push(batch);
        if let Some((n, token)) = &state.cancel_after {
            if state.extract_calls == *n {
                token.cancel();
            }
        }
        Ok(frames)
    }

    async fn encode_frames(
        &self,
        frames_dir: &Path,
        _fps: f64,
        output: &Path,
        _cancel: &CancellationToken,
    ) -> MediaResult<()> {
        if self.fail_encode {
            return Err(MediaError::ffmpeg_failed("encoder crashed", None, Some(1)));
        }
        let count = list_frame_files(frames_dir).await?.len();
        self.state.lock().encoded_frames = count;
        touch(output).await
    }

    async fn generate_thumbnail(&self, _video: &Path, output: &Path) -> MediaResult<()> {
        touch(output).await
    }

    async fn generate_preview(&self, _video: &Path, output: &Path, _secs: f64) -> MediaResult<()> {
        touch(output).await
    }
}

/// Upright figure with every landmark at visibility 0.9.
pub fn standing_pose() -> LandmarkSet {
    let mut xs = [0.5; LANDMARK_COUNT];
    for (left, right) in MIRROR_PAIRS {
        xs[left] = 0.45;
        xs[right] = 0.55;
    }
    let landmarks = (0..LANDMARK_COUNT)
        .map(|id| Landmark::new(id as u8, xs[id], 0.1 + id as f64 * 0.025, 0.0, 0.9))
        .collect();
    LandmarkSet::new(landmarks).unwrap_or_else(|_| LandmarkSet::undetected())
}

pub struct FakeDetector {
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl PoseDetector for FakeDetector {
    async fn detect(&mut self, _image: &RgbImage, _config: &DetectorConfig) -> PoseResult<Option<LandmarkSet>> {
        Ok(Some(standing_pose()))
    }

    fn name(&self) -> &'static str {
        "fake"
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeDetectorFactory {
    pub created: AtomicUsize,
    pub released: Arc<AtomicUsize>,
}

#[async_trait]
impl DetectorFactory for FakeDetectorFactory {
    async fn create(&self, _job_id: &JobId) -> PoseResult<Box<dyn PoseDetector>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDetector {
            released: Arc::clone(&self.released),
        }))
    }
}
