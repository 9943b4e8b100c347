//! HTTP server implementation for the API

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use super::handlers::{self, ApiResult};
use crate::camera::CameraUpdate;
use crate::capture::Orchestrator;
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// Build the application router with all routes and middleware
pub fn build_router(app_state: AppState) -> Router {
    // Configure CORS to allow browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))

        // Camera registry
        .route("/cameras", get(list_cameras_handler))
        .route("/camera/:id", get(get_camera_handler).put(update_camera_handler))

        // Capture control
        .route("/capture", post(capture_all_handler))
        .route("/capture/:id", post(capture_camera_handler))
        .route("/status/:task_id", get(status_handler))
        .route("/stop/:task_id", post(stop_handler))
        .route("/tasks", get(list_tasks_handler))

        // Format control
        .route("/format", get(get_format_handler))
        .route("/format/:value", put(set_format_handler))

        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Configure and start the HTTP server
pub async fn start_http_server(orchestrator: Orchestrator, config: Arc<Config>) -> Result<()> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let app = build_router(AppState { orchestrator });

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("🌐 API server listening on http://{}", address);

    axum::serve(listener, app).await?;

    Ok(())
}

fn respond(result: ApiResult) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    respond(handlers::service_info(&state.orchestrator).await)
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    respond(handlers::health_check().await)
}

async fn list_cameras_handler(State(state): State<AppState>) -> impl IntoResponse {
    respond(handlers::list_cameras(&state.orchestrator).await)
}

async fn get_camera_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    respond(handlers::get_camera(&state.orchestrator, &id).await)
}

async fn update_camera_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<CameraUpdate>,
) -> impl IntoResponse {
    respond(handlers::update_camera(&state.orchestrator, &id, &update).await)
}

/// Capture all enabled cameras
async fn capture_all_handler(State(state): State<AppState>) -> impl IntoResponse {
    respond(handlers::capture_all(&state.orchestrator).await)
}

/// Capture a single camera
async fn capture_camera_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    respond(handlers::capture_camera(&state.orchestrator, &id).await)
}

async fn status_handler(State(state): State<AppState>, Path(task_id): Path<String>) -> impl IntoResponse {
    respond(handlers::task_status(&state.orchestrator, &task_id).await)
}

async fn stop_handler(State(state): State<AppState>, Path(task_id): Path<String>) -> impl IntoResponse {
    respond(handlers::stop_task(&state.orchestrator, &task_id).await)
}

async fn list_tasks_handler(State(state): State<AppState>) -> impl IntoResponse {
    respond(handlers::list_tasks(&state.orchestrator).await)
}

async fn get_format_handler(State(state): State<AppState>) -> impl IntoResponse {
    respond(handlers::get_format(&state.orchestrator).await)
}

async fn set_format_handler(State(state): State<AppState>, Path(value): Path<String>) -> impl IntoResponse {
    respond(handlers::set_format(&state.orchestrator, &value).await)
}
