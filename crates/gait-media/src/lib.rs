//! FFmpeg CLI wrapper for the analysis pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Cancellation and timeouts for every external process
//! - The [`VideoIo`] seam and its FFmpeg implementation

pub mod command;
pub mod error;
pub mod probe;
pub mod video_io;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, VideoInfo};
pub use video_io::{
    frame_file_name, list_frame_files, FfmpegVideoIo, FrameBatch, VideoIo, FRAME_PATTERN,
    PREVIEW_WIDTH, THUMBNAIL_WIDTH,
};
