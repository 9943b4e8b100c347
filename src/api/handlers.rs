//! API request handlers

use serde_json::Value;
use tracing::info;

use super::models::{ApiError, CaptureResponse, DispatchResponse, FormatInfo};
use crate::camera::CameraUpdate;
use crate::capture::Orchestrator;
use crate::format::VideoFormat;
use crate::state::TaskId;

pub type ApiResult = Result<Value, ApiError>;

fn to_value<T: serde::Serialize>(value: T) -> ApiResult {
    serde_json::to_value(value).map_err(|e| ApiError {
        status: axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        message: e.to_string(),
    })
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    TaskId::parse_str(raw).map_err(|_| ApiError::not_found(format!("task {} not found", raw)))
}

/// Handle health check requests
pub async fn health_check() -> ApiResult {
    Ok(serde_json::json!({
        "status": "healthy",
        "service": "multicam-recorder",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Service description with the available endpoints
pub async fn service_info(orchestrator: &Orchestrator) -> ApiResult {
    Ok(serde_json::json!({
        "service": "multicam-recorder",
        "version": env!("CARGO_PKG_VERSION"),
        "format": orchestrator.get_format().await,
        "endpoints": [
            "GET /cameras",
            "GET /camera/{id}",
            "PUT /camera/{id}",
            "POST /capture",
            "POST /capture/{id}",
            "GET /status/{task_id}",
            "POST /stop/{task_id}",
            "GET /tasks",
            "GET /format",
            "PUT /format/{mp4|avi}",
            "GET /health"
        ]
    }))
}

pub async fn list_cameras(orchestrator: &Orchestrator) -> ApiResult {
    to_value(orchestrator.cameras().list().await)
}

pub async fn get_camera(orchestrator: &Orchestrator, id: &str) -> ApiResult {
    let camera = orchestrator
        .cameras()
        .get(id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("camera {} not found", id)))?;
    to_value(camera)
}

pub async fn update_camera(orchestrator: &Orchestrator, id: &str, update: &CameraUpdate) -> ApiResult {
    let camera = orchestrator.cameras().update(id, update).await?;
    to_value(camera)
}

/// Capture every enabled camera and report the batch once it is done
pub async fn capture_all(orchestrator: &Orchestrator) -> ApiResult {
    let outcome = orchestrator.dispatch_all().await?;
    let response = DispatchResponse::from(&outcome);
    orchestrator.spawn_report(outcome);
    to_value(response)
}

pub async fn capture_camera(orchestrator: &Orchestrator, camera_id: &str) -> ApiResult {
    let task_id = orchestrator.dispatch_one(camera_id).await?;
    let task = orchestrator
        .status(&task_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("task {} not found", task_id)))?;

    to_value(CaptureResponse {
        camera_id: task.camera_id,
        task_id,
        format: task.format,
    })
}

pub async fn task_status(orchestrator: &Orchestrator, raw_id: &str) -> ApiResult {
    let task_id = parse_task_id(raw_id)?;
    let task = orchestrator
        .status(&task_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("task {} not found", task_id)))?;
    to_value(task)
}

pub async fn stop_task(orchestrator: &Orchestrator, raw_id: &str) -> ApiResult {
    let task_id = parse_task_id(raw_id)?;
    let task = orchestrator.stop(&task_id).await?;
    to_value(task)
}

pub async fn list_tasks(orchestrator: &Orchestrator) -> ApiResult {
    let tasks = orchestrator.list_tasks().await;
    let stats = orchestrator.statistics().await;
    Ok(serde_json::json!({
        "tasks": tasks,
        "statistics": stats,
    }))
}

pub async fn get_format(orchestrator: &Orchestrator) -> ApiResult {
    to_value(FormatInfo::from(orchestrator.get_format().await))
}

pub async fn set_format(orchestrator: &Orchestrator, value: &str) -> ApiResult {
    let format: VideoFormat = value.parse()?;
    let format = orchestrator.set_format(format).await;
    info!("Format set to {} via API", format);
    to_value(FormatInfo::from(format))
}
