use crate::media::LocalTrack;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

/// What to open on the camera/microphone side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: Option<VideoConstraints>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScreenConstraints {
    pub frame_rate: u32,
    pub with_audio: bool,
}

impl Default for ScreenConstraints {
    fn default() -> Self {
        Self {
            frame_rate: 15,
            with_audio: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no capture device: {0}")]
    NotFound(String),

    /// The user closed the OS picker without choosing a source.
    #[error("cancelled by user")]
    Cancelled,

    #[error("capture failed: {0}")]
    Failed(String),
}

/// Tracks produced by one capture request.
#[derive(Debug, Clone, Default)]
pub struct CaptureStream {
    pub audio: Option<LocalTrack>,
    pub video: Option<LocalTrack>,
}

impl CaptureStream {
    pub fn tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        self.audio.iter().chain(self.video.iter())
    }

    pub fn stop(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

/// Local capture hardware (camera, microphone, screen).
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn open_camera(&self, constraints: &MediaConstraints)
    -> Result<CaptureStream, CaptureError>;

    async fn open_screen(
        &self,
        constraints: &ScreenConstraints,
    ) -> Result<CaptureStream, CaptureError>;
}
