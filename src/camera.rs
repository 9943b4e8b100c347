use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::CaptureError;

pub type CameraId = String;

/// Default recording length in seconds when a camera does not set one
pub const DEFAULT_DURATION_SECS: u64 = 30;

/// Default target frame rate when a camera does not set one
pub const DEFAULT_FPS: u32 = 30;

/// Connection and recording parameters for a single camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Stable, unique identifier
    pub id: CameraId,

    /// Display name
    pub name: String,

    /// Stream URL (MJPEG over HTTP)
    pub url: String,

    /// Target frame rate of the recording
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Maximum recording duration in seconds
    #[serde(default = "default_duration")]
    pub duration: u64,

    /// Whether "capture all" includes this camera
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

fn default_duration() -> u64 {
    DEFAULT_DURATION_SECS
}

fn default_enabled() -> bool {
    true
}

impl CameraConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            fps: DEFAULT_FPS,
            duration: DEFAULT_DURATION_SECS,
            enabled: true,
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    /// Time between two frames at the target rate
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    /// Check the fields a recording job depends on
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.id.trim().is_empty() {
            return Err(CaptureError::InvalidCamera("camera id must not be empty".to_string()));
        }
        if self.fps == 0 {
            return Err(CaptureError::InvalidCamera(format!("camera {}: fps must be greater than 0", self.id)));
        }
        if self.duration == 0 {
            return Err(CaptureError::InvalidCamera(format!(
                "camera {}: duration must be greater than 0",
                self.id
            )));
        }
        url::Url::parse(&self.url)
            .map_err(|e| CaptureError::InvalidCamera(format!("camera {}: invalid url '{}': {}", self.id, self.url, e)))?;
        Ok(())
    }
}

/// Partial update of a camera entry; unset fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub fps: Option<u32>,
    pub duration: Option<u64>,
    pub enabled: Option<bool>,
}

impl CameraUpdate {
    fn apply_to(&self, camera: &mut CameraConfig) {
        if let Some(name) = &self.name {
            camera.name = name.clone();
        }
        if let Some(url) = &self.url {
            camera.url = url.clone();
        }
        if let Some(fps) = self.fps {
            camera.fps = fps;
        }
        if let Some(duration) = self.duration {
            camera.duration = duration;
        }
        if let Some(enabled) = self.enabled {
            camera.enabled = enabled;
        }
    }
}

/// In-memory camera registry shared by the control surface and dispatch.
///
/// Dispatch reads a copy of each entry, so edits only affect captures
/// dispatched afterwards.
#[derive(Debug, Clone, Default)]
pub struct CameraRegistry {
    cameras: Arc<RwLock<BTreeMap<CameraId, CameraConfig>>>,
}

impl CameraRegistry {
    /// Build a registry from configured cameras, rejecting invalid or duplicate entries
    pub fn new(cameras: Vec<CameraConfig>) -> Result<Self, CaptureError> {
        let mut map = BTreeMap::new();
        for camera in cameras {
            camera.validate()?;
            if map.contains_key(&camera.id) {
                return Err(CaptureError::InvalidCamera(format!("duplicate camera id {}", camera.id)));
            }
            map.insert(camera.id.clone(), camera);
        }

        info!("📷 Camera registry initialized with {} cameras", map.len());
        Ok(Self {
            cameras: Arc::new(RwLock::new(map)),
        })
    }

    pub async fn list(&self) -> Vec<CameraConfig> {
        self.cameras.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<CameraConfig> {
        self.cameras.read().await.get(id).cloned()
    }

    /// Identifiers of the cameras enabled right now
    pub async fn enabled_ids(&self) -> Vec<CameraId> {
        self.cameras
            .read()
            .await
            .values()
            .filter(|camera| camera.enabled)
            .map(|camera| camera.id.clone())
            .collect()
    }

    /// Apply a partial update; the entry is left untouched if the result is invalid
    pub async fn update(&self, id: &str, update: &CameraUpdate) -> Result<CameraConfig, CaptureError> {
        let mut cameras = self.cameras.write().await;
        let camera = cameras
            .get_mut(id)
            .ok_or_else(|| CaptureError::CameraNotFound(id.to_string()))?;

        let mut updated = camera.clone();
        update.apply_to(&mut updated);
        updated.validate()?;
        *camera = updated.clone();

        debug!("📝 Updated camera {}: {:?}", id, update);
        Ok(updated)
    }
}
