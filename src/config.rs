use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::CameraConfig;
use crate::format::VideoFormat;

/// Configuration for the multi-camera recorder
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP control surface settings
    pub server: ServerConfig,

    /// Recording and output settings
    pub capture: CaptureConfig,

    /// Task history retention
    pub retention: RetentionConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Configured cameras
    pub cameras: Vec<CameraConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory recorded videos are written to
    pub output_dir: PathBuf,

    /// Directory for batch reports (no reports when unset)
    pub reports_dir: Option<PathBuf>,

    /// Format used until changed at runtime
    pub default_format: VideoFormat,

    /// Output file name template; `{id}`, `{timestamp}` and `{ext}` are substituted
    pub file_name_template: String,

    /// Maximum number of cameras recording at the same time
    pub max_concurrent_jobs: usize,

    /// Connection timeout for camera streams (seconds)
    pub connect_timeout_secs: u64,

    /// ffmpeg executable used for encoding
    pub ffmpeg_binary: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RetentionConfig {
    /// Keep at most this many finished tasks (unbounded when unset)
    pub max_finished_tasks: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `MULTICAM_LOG`/`RUST_LOG` are not set
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("captured_videos"),
            reports_dir: Some(PathBuf::from("reports")),
            default_format: VideoFormat::Avi,
            file_name_template: "camera_{id}_{timestamp}.{ext}".to_string(),
            max_concurrent_jobs: (num_cpus::get() * 2).max(4),
            connect_timeout_secs: 10,
            ffmpeg_binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "multicam_recorder=info,tower_http=info,warn".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Render the output file name for a camera
    pub fn file_name(&self, camera_id: &str, timestamp: &str, format: VideoFormat) -> String {
        self.file_name_template
            .replace("{id}", camera_id)
            .replace("{timestamp}", timestamp)
            .replace("{ext}", format.extension())
    }
}

impl Config {
    /// Load configuration from the first config file found, or from the environment
    pub fn load() -> Result<Self> {
        let config_paths = [
            "multicam-recorder.toml",
            "config/multicam-recorder.toml",
            "/etc/multicam-recorder/config.toml",
        ];

        for path in &config_paths {
            if Path::new(path).exists() {
                match Self::load_from(path) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("Failed to load config file {}: {:#}", path, e),
                }
            }
        }

        Self::from_env()
    }

    /// Load a specific config file, then apply environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.apply_env_overrides()?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `MULTICAM_*` overrides; a value that does not parse is an error
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = var("MULTICAM_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("MULTICAM_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| anyhow!("Invalid MULTICAM_PORT '{}': {}", port, e))?;
        }

        if let Some(output_dir) = var("MULTICAM_OUTPUT_DIR") {
            self.capture.output_dir = PathBuf::from(output_dir);
        }

        if let Some(format) = var("MULTICAM_FORMAT") {
            self.capture.default_format = format
                .parse()
                .map_err(|e| anyhow!("Invalid MULTICAM_FORMAT '{}': {}", format, e))?;
        }

        if let Some(jobs) = var("MULTICAM_MAX_JOBS") {
            self.capture.max_concurrent_jobs = jobs
                .parse()
                .map_err(|e| anyhow!("Invalid MULTICAM_MAX_JOBS '{}': {}", jobs, e))?;
        }

        if let Some(ffmpeg) = var("MULTICAM_FFMPEG") {
            self.capture.ffmpeg_binary = PathBuf::from(ffmpeg);
        }

        if let Some(level) = var("MULTICAM_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("server.port must be greater than 0"));
        }

        if self.capture.max_concurrent_jobs == 0 {
            return Err(anyhow!("capture.max_concurrent_jobs must be greater than 0"));
        }

        if !self.capture.file_name_template.contains("{id}")
            || !self.capture.file_name_template.contains("{timestamp}")
        {
            return Err(anyhow!(
                "capture.file_name_template must contain {{id}} and {{timestamp}}"
            ));
        }

        if self.retention.max_finished_tasks == Some(0) {
            return Err(anyhow!("retention.max_finished_tasks must be greater than 0 when set"));
        }

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            camera.validate()?;
            if !seen.insert(camera.id.as_str()) {
                return Err(anyhow!("Duplicate camera id: {}", camera.id));
            }
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Multicam Recorder Configuration:\n\
            - Listen: {}:{}\n\
            - Output Directory: {}\n\
            - Video Format: {} ({})\n\
            - Max Concurrent Jobs: {}\n\
            - Cameras: {} ({} enabled)",
            self.server.host,
            self.server.port,
            self.capture.output_dir.display(),
            self.capture.default_format,
            self.capture.default_format.codec(),
            self.capture.max_concurrent_jobs,
            self.cameras.len(),
            self.cameras.iter().filter(|c| c.enabled).count()
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.capture.output_dir = dir;
        self
    }

    pub fn with_reports_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.capture.reports_dir = dir;
        self
    }

    pub fn with_format(mut self, format: VideoFormat) -> Self {
        self.config.capture.default_format = format;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.config.capture.max_concurrent_jobs = jobs;
        self
    }

    pub fn with_max_finished_tasks(mut self, max: Option<usize>) -> Self {
        self.config.retention.max_finished_tasks = max;
        self
    }

    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.config.cameras.push(camera);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
