//! Error types for capture control and recording

use std::path::PathBuf;

use crate::state::TaskId;

/// Errors reported synchronously by the orchestrator and camera registry.
///
/// None of these create a task; stream failures are recorded on the task
/// itself as [`RecorderError`] details.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera {0} not found")]
    CameraNotFound(String),

    #[error("camera {0} is disabled")]
    CameraDisabled(String),

    #[error("camera {camera_id} is already recording (task {task_id})")]
    CameraBusy { camera_id: String, task_id: TaskId },

    #[error("no enabled cameras to capture")]
    NoEnabledCameras,

    #[error("invalid video format '{0}', use 'mp4' or 'avi'")]
    InvalidFormat(String),

    #[error("invalid camera settings: {0}")]
    InvalidCamera(String),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),
}

/// Errors raised by a recorder while opening, reading or writing a stream
#[derive(thiserror::Error, Debug)]
pub enum RecorderError {
    #[error("stream unreachable: {0}")]
    Unreachable(String),

    #[error("stream read error: {0}")]
    Stream(String),

    #[error("write error on {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("no frames received from stream")]
    NoFrames,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecorderError {
    pub fn write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
