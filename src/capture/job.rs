//! Execution of a single capture task
//!
//! A [`CaptureJob`] owns the [`TaskWriter`] of its task for its whole life.
//! It waits for a worker slot, opens the recorder, then pulls frames until
//! the camera deadline, a stop request, the end of the stream or an error.
//! The supervisor turns a panic inside the job into a Failed task so no task
//! is ever left Running without an owner.

use chrono::Local;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::camera::CameraConfig;
use crate::config::CaptureConfig;
use crate::error::RecorderError;
use crate::format::VideoFormat;
use crate::recorder::{Recorder, RecordingRequest, RecordingSession};
use crate::state::{RecordingStats, StopReason, TaskWriter};

/// Timestamp layout used in output file names
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

pub struct CaptureJob {
    camera: CameraConfig,
    format: VideoFormat,
    writer: TaskWriter,
    stop_rx: watch::Receiver<bool>,
    settings: Arc<CaptureConfig>,
    recorder: Arc<dyn Recorder>,
}

impl CaptureJob {
    pub fn new(
        camera: CameraConfig,
        format: VideoFormat,
        writer: TaskWriter,
        stop_rx: watch::Receiver<bool>,
        settings: Arc<CaptureConfig>,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        Self {
            camera,
            format,
            writer,
            stop_rx,
            settings,
            recorder,
        }
    }

    /// Run the job on the runtime under supervision
    pub fn spawn(self, slots: Arc<Semaphore>) -> JoinHandle<()> {
        let span = info_span!("capture", camera = %self.camera.id, task = %self.writer.id());
        tokio::spawn(self.supervise(slots).instrument(span))
    }

    async fn supervise(mut self, slots: Arc<Semaphore>) {
        let permit = tokio::select! {
            biased;
            _ = stop_signal(&mut self.stop_rx) => {
                info!("🛑 Stopped while waiting for a worker slot");
                self.writer.mark_running();
                self.writer.fail("stopped before recording started", None);
                return;
            }
            permit = slots.acquire_owned() => permit,
        };

        let _permit = match permit {
            Ok(permit) => permit,
            Err(_) => {
                self.writer.mark_running();
                self.writer.fail("internal fault: capture worker pool closed", None);
                return;
            }
        };

        if AssertUnwindSafe(self.run()).catch_unwind().await.is_err() {
            error!("💥 Capture job panicked");
            self.writer.fail("internal fault: capture job panicked", None);
        }
    }

    async fn run(&mut self) {
        self.writer.mark_running();
        let output_path = self.output_path();
        let request = RecordingRequest::new(&self.camera, self.format, output_path);

        info!(
            "🎥 Starting capture of {} ({}s at {} fps, {})",
            self.camera.name, self.camera.duration, self.camera.fps, self.format
        );

        // the camera deadline also bounds connecting
        let deadline = Instant::now() + self.camera.max_duration();
        let opened = tokio::select! {
            biased;
            _ = stop_signal(&mut self.stop_rx) => Opened::Stopped,
            _ = tokio::time::sleep_until(deadline) => Opened::TimedOut,
            opened = self.recorder.open(request) => Opened::Done(opened),
        };

        let session = match opened {
            Opened::Done(Ok(session)) => session,
            Opened::Done(Err(e)) => {
                let detail = if matches!(e, RecorderError::Unreachable(_)) {
                    e.to_string()
                } else {
                    format!("stream unreachable: {}", e)
                };
                error!("❌ {}: {}", self.camera.name, detail);
                self.writer.fail(detail, None);
                return;
            }
            Opened::Stopped => {
                info!("🛑 Stopped while connecting");
                self.writer.fail("stopped before recording started", None);
                return;
            }
            Opened::TimedOut => {
                let detail = format!(
                    "stream unreachable: no response within {}s",
                    self.camera.duration
                );
                error!("❌ {}: {}", self.camera.name, detail);
                self.writer.fail(detail, None);
                return;
            }
        };

        self.record(session, deadline).await;
    }

    async fn record(&mut self, mut session: Box<dyn RecordingSession>, deadline: Instant) {
        let max_duration = self.camera.max_duration();
        let progress_every = u64::from(self.camera.fps.max(1));
        let started = Instant::now();
        let deadline = tokio::time::sleep_until(deadline);
        tokio::pin!(deadline);

        let mut frames: u64 = 0;
        let reason = loop {
            let frame = tokio::select! {
                biased;
                _ = stop_signal(&mut self.stop_rx) => break StopReason::StopRequested,
                _ = &mut deadline => break StopReason::Deadline,
                next = session.next_frame() => match next {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break StopReason::StreamEnded,
                    Err(e) => return self.fail_recording(session, e, frames, started).await,
                },
            };

            // stop and deadline preempt a stalled encoder too
            let written = tokio::select! {
                biased;
                _ = stop_signal(&mut self.stop_rx) => break StopReason::StopRequested,
                _ = &mut deadline => break StopReason::Deadline,
                written = session.write_frame(frame) => written,
            };
            if let Err(e) = written {
                return self.fail_recording(session, e, frames, started).await;
            }

            frames += 1;
            if frames == 1 {
                if let Some(path) = session.output_path() {
                    self.writer.set_output_path(path);
                }
            }
            if frames % progress_every == 0 {
                debug!(
                    "{}: captured {} frames ({:.2} seconds)",
                    self.camera.name,
                    frames,
                    started.elapsed().as_secs_f64()
                );
            }
        };

        let duration = started.elapsed().min(max_duration);
        match session.finish().await {
            Ok(finished) => {
                info!(
                    "✅ {} saved as {} ({} frames, {:.2}s, {:?})",
                    self.camera.name,
                    finished.path.display(),
                    frames,
                    duration.as_secs_f64(),
                    reason
                );
                let stats = RecordingStats {
                    frames,
                    duration_secs: duration.as_secs_f64(),
                    stop_reason: reason,
                    file_size_bytes: finished.size_bytes,
                };
                self.writer.complete(stats, Some(finished.path));
            }
            Err(e) => {
                error!("❌ Failed to close recording of {}: {}", self.camera.name, e);
                let stats = partial_stats(frames, duration.as_secs_f64());
                self.writer.fail(e.to_string(), stats);
            }
        }
    }

    async fn fail_recording(
        &mut self,
        session: Box<dyn RecordingSession>,
        error: RecorderError,
        frames: u64,
        started: Instant,
    ) {
        let duration = started.elapsed().min(self.camera.max_duration());
        error!("❌ Capture of {} failed after {} frames: {}", self.camera.name, frames, error);

        if let Some(partial) = session.abort().await {
            warn!("Partial recording kept at {}", partial.display());
            self.writer.set_output_path(partial);
        }
        self.writer.fail(error.to_string(), partial_stats(frames, duration.as_secs_f64()));
    }

    /// Final output path, derived from camera id, start time and format
    fn output_path(&self) -> PathBuf {
        let started = self.writer.snapshot().started_at.unwrap_or_else(chrono::Utc::now);
        let timestamp = started.with_timezone(&Local).format(FILE_TIMESTAMP_FORMAT).to_string();
        self.settings
            .output_dir
            .join(self.settings.file_name(&self.camera.id, &timestamp, self.format))
    }
}

enum Opened {
    Done(Result<Box<dyn RecordingSession>, RecorderError>),
    Stopped,
    TimedOut,
}

fn partial_stats(frames: u64, duration_secs: f64) -> Option<RecordingStats> {
    (frames > 0).then_some(RecordingStats {
        frames,
        duration_secs,
        stop_reason: StopReason::Error,
        file_size_bytes: None,
    })
}

/// Resolves once a stop has been requested for the task
async fn stop_signal(stop_rx: &mut watch::Receiver<bool>) {
    if stop_rx.wait_for(|stop| *stop).await.is_err() {
        // sender gone: the task can no longer be stopped
        std::future::pending::<()>().await;
    }
}
