use meshrtc_core::{PeerId, TrackKind};
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// A track received from a remote participant.
#[derive(Clone)]
pub struct RemoteMedia {
    pub track_id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    pub track: Arc<TrackRemote>,
}

/// Where remote media is displayed, keyed by participant.
pub trait RenderSink: Send + Sync {
    fn attach(&self, peer_id: &PeerId, media: RemoteMedia);

    /// Drops everything shown for `peer_id`.
    fn detach(&self, peer_id: &PeerId);
}
