/// Multicam Recorder
///
/// Records MJPEG streams from networked cameras into mp4/avi files. Every
/// camera is captured by its own supervised, time-bounded job whose progress
/// is tracked in an in-memory task registry and exposed over a REST API.

pub mod api;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod format;
pub mod recorder;
pub mod state;

// Re-export main types for easy access
pub use crate::api::ApiServer;
pub use crate::camera::{CameraConfig, CameraId, CameraRegistry, CameraUpdate};
pub use crate::capture::{BatchReport, DispatchOutcome, Orchestrator};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{CaptureError, RecorderError};
pub use crate::format::VideoFormat;
pub use crate::recorder::{Frame, MjpegRecorder, Recorder, RecordingRequest, RecordingSession};
pub use crate::state::{CaptureTask, RecordingStats, StopReason, TaskId, TaskRegistry, TaskState};
