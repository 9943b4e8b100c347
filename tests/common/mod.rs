//! Shared fixtures: a scripted in-memory recorder and orchestrator builders
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use multicam_recorder::config::CaptureConfig;
use multicam_recorder::recorder::{partial_path, FinishedRecording};
use multicam_recorder::{
    CameraConfig, CameraRegistry, Frame, Orchestrator, Recorder, RecorderError, RecordingRequest,
    RecordingSession, TaskRegistry,
};

pub const TEST_FRAME: [u8; 6] = [0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9];

/// How the fake camera behind one camera id behaves
#[derive(Debug, Clone)]
pub struct Script {
    pub frame_interval: Duration,
    pub open_error: Option<String>,
    pub open_delay: Duration,
    /// Stream ends after this many frames
    pub frame_limit: Option<u64>,
    /// Writing fails once this many frames were written
    pub write_error_after: Option<u64>,
    /// Writing never completes once this many frames were written
    pub write_stall_after: Option<u64>,
    pub panic_after: Option<u64>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(100),
            open_error: None,
            open_delay: Duration::ZERO,
            frame_limit: None,
            write_error_after: None,
            write_stall_after: None,
            panic_after: None,
        }
    }
}

impl Script {
    pub fn unreachable() -> Self {
        Self {
            open_error: Some("connection refused".to_string()),
            ..Default::default()
        }
    }

    pub fn ending_after(frames: u64) -> Self {
        Self {
            frame_limit: Some(frames),
            ..Default::default()
        }
    }

    pub fn silent_for(delay: Duration) -> Self {
        Self {
            open_delay: delay,
            ..Default::default()
        }
    }

    pub fn stalling_write_after(frames: u64) -> Self {
        Self {
            write_stall_after: Some(frames),
            ..Default::default()
        }
    }

    pub fn failing_write_after(frames: u64) -> Self {
        Self {
            write_error_after: Some(frames),
            ..Default::default()
        }
    }
}

/// Recorder that produces synthetic frames and writes them to plain files
#[derive(Clone, Default)]
pub struct ScriptedRecorder {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    opened: Arc<AtomicUsize>,
}

impl ScriptedRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, camera_id: &str, script: Script) {
        self.scripts.lock().unwrap().insert(camera_id.to_string(), script);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recorder for ScriptedRecorder {
    async fn open(&self, request: RecordingRequest) -> Result<Box<dyn RecordingSession>, RecorderError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.camera_id)
            .cloned()
            .unwrap_or_default();

        if !script.open_delay.is_zero() {
            tokio::time::sleep(script.open_delay).await;
        }
        if let Some(error) = &script.open_error {
            return Err(RecorderError::Unreachable(error.clone()));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            partial: partial_path(&request.output_path),
            request,
            script,
            produced: 0,
            written: 0,
            file: None,
        }))
    }
}

struct ScriptedSession {
    request: RecordingRequest,
    script: Script,
    partial: PathBuf,
    produced: u64,
    written: u64,
    file: Option<std::fs::File>,
}

#[async_trait]
impl RecordingSession for ScriptedSession {
    async fn next_frame(&mut self) -> Result<Option<Frame>, RecorderError> {
        tokio::time::sleep(self.script.frame_interval).await;
        if self.script.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }
        if self.script.panic_after.is_some_and(|limit| self.produced >= limit) {
            panic!("scripted recorder panic");
        }
        self.produced += 1;
        Ok(Some(Frame::new(TEST_FRAME.to_vec())))
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), RecorderError> {
        if self.script.write_error_after.is_some_and(|limit| self.written >= limit) {
            return Err(RecorderError::write(&self.partial, "disk full"));
        }
        if self.script.write_stall_after.is_some_and(|limit| self.written >= limit) {
            std::future::pending::<()>().await;
        }
        if self.file.is_none() {
            if let Some(parent) = self.partial.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.file = Some(std::fs::File::create(&self.partial)?);
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(&frame.data)?;
        }
        self.written += 1;
        Ok(())
    }

    fn output_path(&self) -> Option<PathBuf> {
        self.file.as_ref().map(|_| self.partial.clone())
    }

    async fn finish(self: Box<Self>) -> Result<FinishedRecording, RecorderError> {
        let Some(file) = self.file else {
            return Err(RecorderError::NoFrames);
        };
        file.sync_all()?;
        drop(file);
        std::fs::rename(&self.partial, &self.request.output_path)?;
        let size_bytes = std::fs::metadata(&self.request.output_path).ok().map(|m| m.len());
        Ok(FinishedRecording {
            path: self.request.output_path,
            size_bytes,
        })
    }

    async fn abort(self: Box<Self>) -> Option<PathBuf> {
        let session = *self;
        session.file.map(|_| session.partial)
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub recorder: ScriptedRecorder,
    pub temp_dir: TempDir,
}

impl Harness {
    pub fn output_dir(&self) -> &Path {
        self.temp_dir.path()
    }
}

pub fn camera(id: &str, duration: u64, fps: u32) -> CameraConfig {
    CameraConfig::new(id, format!("Camera {}", id), format!("http://cameras.test/{}/video_feed", id))
        .with_duration(duration)
        .with_fps(fps)
}

pub fn harness(cameras: Vec<CameraConfig>) -> Harness {
    harness_with(cameras, 8, None)
}

pub fn harness_with(cameras: Vec<CameraConfig>, max_jobs: usize, max_finished: Option<usize>) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let settings = CaptureConfig {
        output_dir: temp_dir.path().join("videos"),
        reports_dir: Some(temp_dir.path().join("reports")),
        max_concurrent_jobs: max_jobs,
        ..Default::default()
    };

    let recorder = ScriptedRecorder::new();
    let orchestrator = Orchestrator::new(
        settings,
        CameraRegistry::new(cameras).unwrap(),
        TaskRegistry::new(max_finished),
        Arc::new(recorder.clone()),
    );

    Harness {
        orchestrator,
        recorder,
        temp_dir,
    }
}

/// Files currently in the video output directory
pub fn output_files(harness: &Harness) -> Vec<PathBuf> {
    match std::fs::read_dir(harness.output_dir().join("videos")) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
