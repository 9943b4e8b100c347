mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use common::{camera, harness, Harness, Script};
use multicam_recorder::api::{build_router, AppState};

fn router(h: &Harness) -> Router {
    build_router(AppState {
        orchestrator: h.orchestrator.clone(),
    })
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_and_root() {
    let h = harness(vec![]);
    let app = router(&h);

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["format"], "avi");
    assert!(body["endpoints"].as_array().unwrap().len() >= 10);
}

#[tokio::test]
async fn test_camera_listing_and_update() {
    let h = harness(vec![camera("cam1", 30, 30), camera("cam2", 10, 15).with_enabled(false)]);
    let app = router(&h);

    let (status, body) = call(&app, Method::GET, "/cameras", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["id"], "cam1");

    let (status, body) = call(&app, Method::GET, "/camera/cam2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], false);

    let update = serde_json::json!({"enabled": true, "duration": 5});
    let (status, body) = call(&app, Method::PUT, "/camera/cam2", Some(update)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);
    assert_eq!(body["duration"], 5);

    let (status, _) = call(&app, Method::GET, "/camera/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let invalid = serde_json::json!({"fps": 0});
    let (status, body) = call(&app, Method::PUT, "/camera/cam1", Some(invalid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("fps"));
}

#[tokio::test]
async fn test_capture_camera_and_poll_status() {
    let h = harness(vec![camera("cam1", 1, 10)]);
    h.recorder.script("cam1", Script::ending_after(2));
    let app = router(&h);

    let (status, body) = call(&app, Method::POST, "/capture/cam1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["camera_id"], "cam1");
    assert_eq!(body["format"], "avi");
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::GET, &format!("/status/{}", task_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["state"], "completed");

    let (status, _) = call(&app, Method::POST, "/capture/cam1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let id = task_id.parse().unwrap();
    h.orchestrator.wait(&id).await.unwrap();

    let (status, body) = call(&app, Method::GET, &format!("/status/{}", task_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "completed");
    assert_eq!(body["stats"]["frames"], 2);
    assert!(body["finished_at"].is_string());

    let (status, body) = call(&app, Method::GET, "/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statistics"]["completed"], 1);
}

#[tokio::test]
async fn test_capture_errors() {
    let h = harness(vec![camera("cam1", 1, 10).with_enabled(false)]);
    let app = router(&h);

    let (status, _) = call(&app, Method::POST, "/capture/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, Method::POST, "/capture/cam1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("disabled"));

    let (status, _) = call(&app, Method::POST, "/capture", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_capture_all_reports_rejections_per_camera() {
    let h = harness(vec![camera("cam1", 1, 10), camera("cam2", 1, 10)]);
    h.recorder.script("cam1", Script::ending_after(1));
    h.recorder.script("cam2", Script::ending_after(1));
    let app = router(&h);

    let busy = h.orchestrator.dispatch_one("cam2").await.unwrap();

    let (status, body) = call(&app, Method::POST, "/capture", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["tasks"]["cam1"].is_string());
    assert!(body["rejected"]["cam2"].as_str().unwrap().contains(&busy.to_string()));
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let h = harness(vec![]);
    let app = router(&h);

    let (status, _) = call(&app, Method::GET, "/status/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let unknown = uuid::Uuid::new_v4();
    let (status, body) = call(&app, Method::GET, &format!("/status/{}", unknown), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let (status, _) = call(&app, Method::POST, &format!("/stop/{}", unknown), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stop_endpoint() {
    let h = harness(vec![camera("cam1", 60, 10)]);
    let app = router(&h);

    let task_id = h.orchestrator.dispatch_one("cam1").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(350)).await;

    let (status, _) = call(&app, Method::POST, &format!("/stop/{}", task_id), None).await;
    assert_eq!(status, StatusCode::OK);

    let task = h.orchestrator.wait(&task_id).await.unwrap();
    assert_eq!(task.state, multicam_recorder::TaskState::Completed);
    assert_eq!(
        task.stats.unwrap().stop_reason,
        multicam_recorder::StopReason::StopRequested
    );
}

#[tokio::test]
async fn test_format_control() {
    let h = harness(vec![]);
    let app = router(&h);

    let (status, body) = call(&app, Method::GET, "/format", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["format"], "avi");
    assert_eq!(body["codec"], "I420");
    assert_eq!(body["compressed"], false);

    let (status, body) = call(&app, Method::PUT, "/format/MP4", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["format"], "mp4");
    assert_eq!(body["codec"], "mp4v");

    let (status, body) = call(&app, Method::PUT, "/format/mkv", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("mkv"));

    let (_, body) = call(&app, Method::GET, "/format", None).await;
    assert_eq!(body["format"], "mp4");
}
