use crate::session::{Role, SessionId, SessionState};
use meshrtc_core::PeerId;
use serde::Serialize;
use tokio::time::Instant;

/// What the remote participant told us about its own media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMediaStatus {
    pub has_audio: bool,
    pub has_video: bool,
    pub is_sharing: bool,
}

impl Default for RemoteMediaStatus {
    fn default() -> Self {
        Self {
            has_audio: true,
            has_video: true,
            is_sharing: false,
        }
    }
}

/// Observable snapshot of one session.
#[derive(Debug, Clone)]
pub struct PeerStatus {
    pub peer_id: PeerId,
    pub session_id: SessionId,
    pub state: SessionState,
    pub role: Role,
    pub last_error: Option<String>,
    pub last_activity: Instant,
    pub remote_media: RemoteMediaStatus,
}
