//! ffmpeg-backed video writer
//!
//! JPEG frames are piped into `ffmpeg -f image2pipe` which encodes them into
//! the selected container. The file is written under a `.part` name and only
//! renamed to its final name once ffmpeg exits cleanly.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use super::{partial_path, FinishedRecording, RecordingRequest};
use crate::error::RecorderError;

/// How long a closing ffmpeg may take to finalize the container
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    partial_path: PathBuf,
    final_path: PathBuf,
    frames: u64,
}

impl FfmpegEncoder {
    /// Start ffmpeg writing to the partial path of `request.output_path`
    pub async fn spawn(binary: &Path, request: &RecordingRequest) -> Result<Self, RecorderError> {
        let final_path = request.output_path.clone();
        let partial_path = partial_path(&final_path);

        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RecorderError::write(parent, e))?;
        }

        let fps = request.fps.max(1).to_string();
        let mut args: Vec<&str> = vec![
            "-hide_banner",
            "-loglevel", "error",
            "-f", "image2pipe",
            "-c:v", "mjpeg",
            "-framerate", &fps,
            "-i", "-",
        ];
        args.extend(request.format.ffmpeg_args());
        args.push("-y");

        let mut child = Command::new(binary)
            .args(&args)
            .arg(&partial_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecorderError::write(&partial_path, format!("failed to start {}: {}", binary.display(), e)))?;

        let stdin = child.stdin.take();
        info!(
            "🎬 Encoding {} as {} ({}) to {}",
            request.camera_id,
            request.format,
            request.format.codec(),
            partial_path.display()
        );

        Ok(Self {
            child,
            stdin,
            partial_path,
            final_path,
            frames: 0,
        })
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    pub async fn write_frame(&mut self, data: &[u8]) -> Result<(), RecorderError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RecorderError::write(&self.partial_path, "encoder input already closed"))?;

        stdin
            .write_all(data)
            .await
            .map_err(|e| RecorderError::write(&self.partial_path, e))?;
        self.frames += 1;
        Ok(())
    }

    /// Close the input, wait for ffmpeg and move the file to its final name
    pub async fn finish(mut self) -> Result<FinishedRecording, RecorderError> {
        self.close_input().await;

        let output = match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| RecorderError::write(&self.partial_path, e))?,
            Err(_) => {
                return Err(RecorderError::write(
                    &self.partial_path,
                    "encoder did not exit after input was closed",
                ))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecorderError::write(
                &self.partial_path,
                format!("encoder exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        tokio::fs::rename(&self.partial_path, &self.final_path)
            .await
            .map_err(|e| RecorderError::write(&self.final_path, e))?;

        let size_bytes = tokio::fs::metadata(&self.final_path).await.ok().map(|m| m.len());
        debug!("💾 {} frames written to {}", self.frames, self.final_path.display());

        Ok(FinishedRecording {
            path: self.final_path,
            size_bytes,
        })
    }

    /// Stop encoding after a failure; the partial file stays on disk
    pub async fn abort(mut self) -> PathBuf {
        self.close_input().await;

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Encoder for {} exited with {}", self.partial_path.display(), status),
            Ok(Err(e)) => warn!("Failed to wait for encoder: {}", e),
            Err(_) => {
                warn!("Encoder for {} did not exit, killing it", self.partial_path.display());
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill encoder: {}", e);
                }
            }
        }

        self.partial_path
    }

    async fn close_input(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                debug!("Encoder input already closed: {}", e);
            }
        }
    }
}
