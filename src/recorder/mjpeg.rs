use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{FfmpegEncoder, FinishedRecording, Frame, Recorder, RecordingRequest, RecordingSession};
use crate::error::RecorderError;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Upper bound on buffered bytes without a complete frame
pub const MAX_FRAME_BUFFER: usize = 16 * 1024 * 1024;

/// Splits a multipart MJPEG byte stream into JPEG images on SOI/EOI markers
#[derive(Debug, Default)]
pub struct JpegSplitter {
    buffer: BytesMut,
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<(), RecorderError> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > MAX_FRAME_BUFFER {
            self.buffer.clear();
            return Err(RecorderError::Stream(format!(
                "no complete JPEG frame within {} bytes",
                MAX_FRAME_BUFFER
            )));
        }
        Ok(())
    }

    /// Pop the next complete JPEG image, discarding multipart headers before it
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let start = find_marker(&self.buffer, &JPEG_SOI, 0)?;
        if start > 0 {
            let _ = self.buffer.split_to(start);
        }

        let end = find_marker(&self.buffer, &JPEG_EOI, JPEG_SOI.len())?;
        Some(self.buffer.split_to(end + JPEG_EOI.len()).freeze())
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

fn find_marker(haystack: &[u8], marker: &[u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + marker.len() {
        return None;
    }
    haystack[from..]
        .windows(marker.len())
        .position(|window| window == marker)
        .map(|pos| pos + from)
}

/// Records MJPEG-over-HTTP camera feeds through an ffmpeg encoder
#[derive(Debug, Clone)]
pub struct MjpegRecorder {
    client: reqwest::Client,
    response_timeout: Duration,
    ffmpeg_binary: PathBuf,
}

impl MjpegRecorder {
    /// `connect_timeout` bounds both the TCP connect and the wait for response
    /// headers; the body stream itself is not bounded.
    pub fn new(connect_timeout: Duration, ffmpeg_binary: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with connect timeout, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            response_timeout: connect_timeout,
            ffmpeg_binary: ffmpeg_binary.into(),
        }
    }
}

#[async_trait]
impl Recorder for MjpegRecorder {
    async fn open(&self, request: RecordingRequest) -> Result<Box<dyn RecordingSession>, RecorderError> {
        info!("🔌 Connecting to {} ({})", request.camera_id, request.url);

        let response = tokio::time::timeout(self.response_timeout, self.client.get(&request.url).send())
            .await
            .map_err(|_| {
                RecorderError::Unreachable(format!(
                    "no response within {}s",
                    self.response_timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| RecorderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecorderError::Unreachable(format!("HTTP status {}", status)));
        }

        Ok(Box::new(MjpegSession {
            stream: response.bytes_stream().boxed(),
            splitter: JpegSplitter::new(),
            encoder: None,
            ffmpeg_binary: self.ffmpeg_binary.clone(),
            request,
        }))
    }
}

/// Open MJPEG stream plus the lazily started encoder
struct MjpegSession {
    request: RecordingRequest,
    stream: BoxStream<'static, reqwest::Result<Bytes>>,
    splitter: JpegSplitter,
    encoder: Option<FfmpegEncoder>,
    ffmpeg_binary: PathBuf,
}

#[async_trait]
impl RecordingSession for MjpegSession {
    async fn next_frame(&mut self) -> Result<Option<Frame>, RecorderError> {
        loop {
            if let Some(data) = self.splitter.next_frame() {
                return Ok(Some(Frame::new(data)));
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.splitter.push(&chunk)?,
                Some(Err(e)) => return Err(RecorderError::Stream(e.to_string())),
                None => {
                    if self.splitter.buffered() > 0 {
                        debug!(
                            "Stream for {} ended with {} unframed bytes",
                            self.request.camera_id,
                            self.splitter.buffered()
                        );
                    }
                    return Ok(None);
                }
            }
        }
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), RecorderError> {
        if self.encoder.is_none() {
            let encoder = FfmpegEncoder::spawn(&self.ffmpeg_binary, &self.request).await?;
            self.encoder = Some(encoder);
        }

        match self.encoder.as_mut() {
            Some(encoder) => encoder.write_frame(&frame.data).await,
            None => Err(RecorderError::write(&self.request.output_path, "encoder not started")),
        }
    }

    fn output_path(&self) -> Option<PathBuf> {
        self.encoder.as_ref().map(|encoder| encoder.partial_path().to_path_buf())
    }

    async fn finish(self: Box<Self>) -> Result<FinishedRecording, RecorderError> {
        match self.encoder {
            Some(encoder) => encoder.finish().await,
            None => Err(RecorderError::NoFrames),
        }
    }

    async fn abort(self: Box<Self>) -> Option<PathBuf> {
        match self.encoder {
            Some(encoder) => Some(encoder.abort().await),
            None => {
                warn!("Aborting {} before any frame was written", self.request.camera_id);
                None
            }
        }
    }
}
