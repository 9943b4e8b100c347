//! Recorder seam between capture jobs and the media pipeline
//!
//! A [`Recorder`] opens a camera stream and hands back a [`RecordingSession`]
//! that yields frames and writes them to the output file. Capture jobs drive
//! the session one frame at a time so they can react to stop requests and
//! deadlines between frames.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::camera::{CameraConfig, CameraId};
use crate::error::RecorderError;
use crate::format::VideoFormat;

pub mod encoder;
pub mod mjpeg;

pub use encoder::FfmpegEncoder;
pub use mjpeg::{JpegSplitter, MjpegRecorder};

/// One encoded frame as received from the camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Bytes,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Everything a recorder needs to record one camera
#[derive(Debug, Clone)]
pub struct RecordingRequest {
    pub camera_id: CameraId,
    pub url: String,
    pub fps: u32,
    pub format: VideoFormat,
    pub output_path: PathBuf,
}

impl RecordingRequest {
    pub fn new(camera: &CameraConfig, format: VideoFormat, output_path: PathBuf) -> Self {
        Self {
            camera_id: camera.id.clone(),
            url: camera.url.clone(),
            fps: camera.fps,
            format,
            output_path,
        }
    }
}

/// Result of a cleanly closed recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedRecording {
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
}

#[async_trait]
pub trait Recorder: Send + Sync + 'static {
    /// Connect to the camera stream. No output file exists after a failed open.
    async fn open(&self, request: RecordingRequest) -> Result<Box<dyn RecordingSession>, RecorderError>;
}

#[async_trait]
pub trait RecordingSession: Send {
    /// Wait for the next frame; `Ok(None)` once the stream has ended.
    ///
    /// Must be cancel-safe: dropping the future loses no received data.
    async fn next_frame(&mut self) -> Result<Option<Frame>, RecorderError>;

    /// Append a frame to the output file
    async fn write_frame(&mut self, frame: Frame) -> Result<(), RecorderError>;

    /// File currently being written, `None` before the first frame
    fn output_path(&self) -> Option<PathBuf>;

    /// Flush and close the output, leaving a playable file at its final path
    async fn finish(self: Box<Self>) -> Result<FinishedRecording, RecorderError>;

    /// Close the stream after a failure, keeping whatever was written.
    /// Returns the path of the partial file, if any.
    async fn abort(self: Box<Self>) -> Option<PathBuf>;
}

/// Name of the in-progress file for a recording; only finished recordings
/// carry the bare container extension.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_keeps_extension_visible() {
        let path = Path::new("/videos/camera_cam1_20240101_120000_000.mp4");
        assert_eq!(
            partial_path(path),
            PathBuf::from("/videos/camera_cam1_20240101_120000_000.mp4.part")
        );
    }

    #[test]
    fn test_request_copies_camera_settings() {
        let camera = CameraConfig::new("cam1", "Door", "http://door.local/feed").with_fps(12);
        let request = RecordingRequest::new(&camera, VideoFormat::Mp4, PathBuf::from("out.mp4"));
        assert_eq!(request.fps, 12);
        assert_eq!(request.url, "http://door.local/feed");
        assert_eq!(request.format, VideoFormat::Mp4);
    }
}
