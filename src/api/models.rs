//! API data models

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::camera::CameraId;
use crate::capture::DispatchOutcome;
use crate::error::CaptureError;
use crate::format::VideoFormat;
use crate::state::TaskId;

/// Response of a capture-all request
#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub format: VideoFormat,
    pub tasks: BTreeMap<CameraId, TaskId>,
    pub rejected: BTreeMap<CameraId, String>,
}

impl From<&DispatchOutcome> for DispatchResponse {
    fn from(outcome: &DispatchOutcome) -> Self {
        Self {
            format: outcome.format,
            tasks: outcome.tasks.clone(),
            rejected: outcome
                .rejected
                .iter()
                .map(|(camera_id, e)| (camera_id.clone(), e.to_string()))
                .collect(),
        }
    }
}

/// Response of a single-camera capture request
#[derive(Debug, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub camera_id: CameraId,
    pub task_id: TaskId,
    pub format: VideoFormat,
}

/// Current video format with its codec details
#[derive(Debug, Serialize, Deserialize)]
pub struct FormatInfo {
    pub format: VideoFormat,
    pub codec: String,
    pub compressed: bool,
}

impl From<VideoFormat> for FormatInfo {
    fn from(format: VideoFormat) -> Self {
        Self {
            format,
            codec: format.codec().to_string(),
            compressed: format.is_compressed(),
        }
    }
}

/// Error returned to API clients as `{"error": message}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<CaptureError> for ApiError {
    fn from(error: CaptureError) -> Self {
        let status = match &error {
            CaptureError::CameraNotFound(_) | CaptureError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            CaptureError::CameraDisabled(_) | CaptureError::CameraBusy { .. } | CaptureError::NoEnabledCameras => {
                StatusCode::CONFLICT
            }
            CaptureError::InvalidFormat(_) | CaptureError::InvalidCamera(_) => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({"error": self.message}))).into_response()
    }
}
