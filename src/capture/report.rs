use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::camera::CameraId;
use crate::format::VideoFormat;
use crate::state::{CaptureTask, TaskId, TaskState};

/// Outcome of one camera in a capture batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraResult {
    pub camera_id: CameraId,
    pub task_id: TaskId,
    pub state: TaskState,
    pub success: bool,
    pub message: String,
    pub output_path: Option<PathBuf>,
    pub frames: Option<u64>,
    pub duration_secs: Option<f64>,
    pub size_mb: Option<f64>,
}

impl From<&CaptureTask> for CameraResult {
    fn from(task: &CaptureTask) -> Self {
        let success = task.state == TaskState::Completed;
        let message = match (&task.error, task.state) {
            (Some(error), _) => error.clone(),
            (None, TaskState::Completed) => "recording completed".to_string(),
            (None, state) => format!("task still {:?}", state).to_lowercase(),
        };

        Self {
            camera_id: task.camera_id.clone(),
            task_id: task.id,
            state: task.state,
            success,
            message,
            output_path: task.output_path.clone(),
            frames: task.stats.as_ref().map(|s| s.frames),
            duration_secs: task.stats.as_ref().map(|s| s.duration_secs),
            size_mb: task
                .stats
                .as_ref()
                .and_then(|s| s.file_size_bytes)
                .map(|bytes| (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0),
        }
    }
}

/// Summary of a capture batch, written as JSON once every task has finished
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub date: DateTime<Local>,
    pub total_cameras: usize,
    pub successful: usize,
    pub failed: usize,
    pub video_format: String,
    pub results: Vec<CameraResult>,

    /// Cameras that were requested but never got a task
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rejected: BTreeMap<CameraId, String>,
}

impl BatchReport {
    pub fn new(format: VideoFormat, tasks: &[CaptureTask], rejected: BTreeMap<CameraId, String>) -> Self {
        let results: Vec<CameraResult> = tasks.iter().map(CameraResult::from).collect();
        let successful = results.iter().filter(|r| r.success).count();

        Self {
            date: Local::now(),
            total_cameras: results.len() + rejected.len(),
            successful,
            failed: results.len() - successful + rejected.len(),
            video_format: format!("{} ({})", format.to_string().to_uppercase(), format.codec()),
            results,
            rejected,
        }
    }

    /// Write the report as `capture_<timestamp>.json` into `dir`
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create reports directory {}", dir.display()))?;

        let path = dir.join(format!("capture_{}.json", self.date.format("%Y%m%d_%H%M%S")));
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;

        info!(
            "📊 Capture report: {}/{} cameras recorded, saved to {}",
            self.successful,
            self.total_cameras,
            path.display()
        );
        Ok(path)
    }
}
