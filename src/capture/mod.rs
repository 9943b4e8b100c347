//! Capture orchestration
//!
//! The [`Orchestrator`] turns capture requests into registered tasks and
//! spawns one supervised [`CaptureJob`] per task. Dispatch returns as soon as
//! every task is registered; the recordings run in the background and report
//! progress only through the task registry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::camera::{CameraId, CameraRegistry};
use crate::config::{CaptureConfig, Config};
use crate::error::CaptureError;
use crate::format::VideoFormat;
use crate::recorder::{MjpegRecorder, Recorder};
use crate::state::{CaptureTask, RegistryStats, TaskId, TaskRegistry};

pub mod job;
pub mod report;

pub use job::CaptureJob;
pub use report::{BatchReport, CameraResult};

/// Result of a dispatch request.
///
/// Each requested camera ends up in exactly one of the two maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    /// Format every task of this dispatch records in
    pub format: VideoFormat,
    pub tasks: BTreeMap<CameraId, TaskId>,
    pub rejected: BTreeMap<CameraId, CaptureError>,
}

impl DispatchOutcome {
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.values().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Entry point for starting, stopping and observing captures
#[derive(Clone)]
pub struct Orchestrator {
    cameras: CameraRegistry,
    tasks: TaskRegistry,
    recorder: Arc<dyn Recorder>,
    format: Arc<RwLock<VideoFormat>>,
    settings: Arc<CaptureConfig>,
    worker_semaphore: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        settings: CaptureConfig,
        cameras: CameraRegistry,
        tasks: TaskRegistry,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        let max_workers = settings.max_concurrent_jobs.max(1);
        info!(
            "🔧 Initializing orchestrator ({} workers, default format {})",
            max_workers, settings.default_format
        );

        Self {
            cameras,
            tasks,
            recorder,
            format: Arc::new(RwLock::new(settings.default_format)),
            settings: Arc::new(settings),
            worker_semaphore: Arc::new(Semaphore::new(max_workers)),
        }
    }

    /// Build an orchestrator recording MJPEG streams through ffmpeg
    pub fn from_config(config: &Config) -> Result<Self, CaptureError> {
        let cameras = CameraRegistry::new(config.cameras.clone())?;
        let tasks = TaskRegistry::new(config.retention.max_finished_tasks);
        let recorder = MjpegRecorder::new(
            config.capture.connect_timeout(),
            config.capture.ffmpeg_binary.clone(),
        );
        Ok(Self::new(config.capture.clone(), cameras, tasks, Arc::new(recorder)))
    }

    pub fn cameras(&self) -> &CameraRegistry {
        &self.cameras
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn settings(&self) -> &CaptureConfig {
        &self.settings
    }

    /// Start a capture for each given camera.
    ///
    /// Cameras that cannot be captured are reported in
    /// [`DispatchOutcome::rejected`] without affecting the others.
    pub async fn dispatch(&self, camera_ids: &[CameraId]) -> DispatchOutcome {
        let format = *self.format.read().await;
        let mut outcome = DispatchOutcome {
            format,
            ..Default::default()
        };

        let unique: BTreeSet<&CameraId> = camera_ids.iter().collect();
        for camera_id in unique {
            match self.launch(camera_id, format).await {
                Ok(task_id) => {
                    outcome.tasks.insert(camera_id.clone(), task_id);
                }
                Err(e) => {
                    warn!("⚠️  Not capturing {}: {}", camera_id, e);
                    outcome.rejected.insert(camera_id.clone(), e);
                }
            }
        }

        info!(
            "🚀 Dispatched {} captures as {} ({} rejected)",
            outcome.tasks.len(),
            format,
            outcome.rejected.len()
        );
        outcome
    }

    /// Start a capture for every enabled camera
    pub async fn dispatch_all(&self) -> Result<DispatchOutcome, CaptureError> {
        let enabled = self.cameras.enabled_ids().await;
        if enabled.is_empty() {
            return Err(CaptureError::NoEnabledCameras);
        }
        Ok(self.dispatch(&enabled).await)
    }

    /// Start a capture for a single camera
    pub async fn dispatch_one(&self, camera_id: &str) -> Result<TaskId, CaptureError> {
        let format = *self.format.read().await;
        let task_id = self.launch(camera_id, format).await?;
        info!("🚀 Dispatched capture of {} as {}", camera_id, format);
        Ok(task_id)
    }

    async fn launch(&self, camera_id: &str, format: VideoFormat) -> Result<TaskId, CaptureError> {
        let camera = self
            .cameras
            .get(camera_id)
            .await
            .ok_or_else(|| CaptureError::CameraNotFound(camera_id.to_string()))?;
        if !camera.enabled {
            return Err(CaptureError::CameraDisabled(camera.id));
        }

        let registered = self.tasks.register(&camera.id, format).await?;
        let task_id = registered.id;

        CaptureJob::new(
            camera,
            format,
            registered.writer,
            registered.stop_rx,
            Arc::clone(&self.settings),
            Arc::clone(&self.recorder),
        )
        .spawn(Arc::clone(&self.worker_semaphore));

        Ok(task_id)
    }

    pub async fn status(&self, task_id: &TaskId) -> Option<CaptureTask> {
        self.tasks.snapshot(task_id).await
    }

    /// Ask a task to stop; finished tasks are returned unchanged
    pub async fn stop(&self, task_id: &TaskId) -> Result<CaptureTask, CaptureError> {
        self.tasks.request_stop(task_id).await
    }

    pub async fn list_tasks(&self) -> Vec<CaptureTask> {
        self.tasks.list().await
    }

    pub async fn statistics(&self) -> RegistryStats {
        self.tasks.statistics().await
    }

    pub async fn get_format(&self) -> VideoFormat {
        *self.format.read().await
    }

    /// Change the format of future dispatches; running tasks keep theirs
    pub async fn set_format(&self, format: VideoFormat) -> VideoFormat {
        let mut current = self.format.write().await;
        let previous = std::mem::replace(&mut *current, format);
        info!("🎞️  Video format changed from {} to {}", previous, format);
        format
    }

    /// Wait until a task is terminal and return its final record
    pub async fn wait(&self, task_id: &TaskId) -> Option<CaptureTask> {
        let mut rx = self.tasks.subscribe(task_id).await?;
        let finished = rx.wait_for(|task| task.is_terminal()).await.map(|task| task.clone()).ok();
        // writer dropped: report the last state it left behind
        Some(finished.unwrap_or_else(|| rx.borrow().clone()))
    }

    /// Wait for every given task, in order
    pub async fn wait_all(&self, task_ids: &[TaskId]) -> Vec<CaptureTask> {
        let waits = task_ids.iter().map(|id| self.wait(id));
        futures::future::join_all(waits).await.into_iter().flatten().collect()
    }

    /// Wait for a dispatched batch and build its report
    pub async fn summarize(&self, outcome: &DispatchOutcome) -> BatchReport {
        let tasks = self.wait_all(&outcome.task_ids()).await;
        let rejected = outcome
            .rejected
            .iter()
            .map(|(camera_id, e)| (camera_id.clone(), e.to_string()))
            .collect();
        BatchReport::new(outcome.format, &tasks, rejected)
    }

    /// Write the batch report in the background once all tasks have finished.
    ///
    /// Returns `None` when reports are disabled or nothing was dispatched.
    pub fn spawn_report(&self, outcome: DispatchOutcome) -> Option<JoinHandle<()>> {
        let reports_dir = self.settings.reports_dir.clone()?;
        if outcome.is_empty() {
            return None;
        }

        let orchestrator = self.clone();
        Some(tokio::spawn(async move {
            let report = orchestrator.summarize(&outcome).await;
            if let Err(e) = report.write_to(&reports_dir).await {
                error!("Failed to write capture report: {:#}", e);
            }
        }))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("available_workers", &self.worker_semaphore.available_permits())
            .finish_non_exhaustive()
    }
}
