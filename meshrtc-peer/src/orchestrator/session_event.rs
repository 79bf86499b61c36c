use crate::error::OrchestratorError;
use crate::media::LocalMediaStatus;
use crate::session::{CloseReason, RemoteMediaStatus, SessionId, SessionState};
use bytes::Bytes;
use meshrtc_core::{PeerId, TrackKind};

/// Lifecycle notifications broadcast to every subscriber of a
/// [`crate::OrchestratorHandle`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PeerStateChanged {
        peer_id: PeerId,
        session_id: SessionId,
        state: SessionState,
    },
    PeerConnected {
        peer_id: PeerId,
        session_id: SessionId,
    },
    PeerDisconnected {
        peer_id: PeerId,
        session_id: SessionId,
    },
    PeerClosed {
        peer_id: PeerId,
        session_id: SessionId,
        reason: CloseReason,
    },
    ConnectedCountChanged(usize),
    RemoteMediaChanged {
        peer_id: PeerId,
        status: RemoteMediaStatus,
    },
    RemoteTrack {
        peer_id: PeerId,
        track_id: String,
        kind: TrackKind,
    },
    DataReceived {
        peer_id: PeerId,
        data: Bytes,
    },
    LocalMediaChanged(LocalMediaStatus),
    /// The local participant was removed from the room.
    LocalKicked,
    Error {
        peer_id: Option<PeerId>,
        error: OrchestratorError,
    },
}
