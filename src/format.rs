use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CaptureError;

/// Container format used for recorded videos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// MPEG-4 part 2 in an mp4 container (compressed)
    Mp4,
    /// Raw I420 frames in an avi container (uncompressed)
    #[default]
    Avi,
}

impl VideoFormat {
    /// File extension without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Avi => "avi",
        }
    }

    /// FourCC of the codec written into the container
    pub fn codec(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4v",
            VideoFormat::Avi => "I420",
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, VideoFormat::Mp4)
    }

    /// Output-side ffmpeg arguments for this format
    pub fn ffmpeg_args(&self) -> Vec<&'static str> {
        match self {
            VideoFormat::Mp4 => vec![
                "-c:v", "mpeg4",
                "-vtag", "mp4v",
                "-q:v", "5",
                "-pix_fmt", "yuv420p",
                "-f", "mp4",
            ],
            VideoFormat::Avi => vec![
                "-c:v", "rawvideo",
                "-pix_fmt", "yuv420p",
                "-vtag", "I420",
                "-f", "avi",
            ],
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for VideoFormat {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp4" => Ok(VideoFormat::Mp4),
            "avi" => Ok(VideoFormat::Avi),
            _ => Err(CaptureError::InvalidFormat(s.to_string())),
        }
    }
}
