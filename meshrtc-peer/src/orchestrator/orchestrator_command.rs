use crate::error::OrchestratorError;
use crate::media::{LocalMediaStatus, MediaConstraints};
use crate::orchestrator::SwapReport;
use crate::session::PeerStatus;
use bytes::Bytes;
use meshrtc_core::{PeerId, RosterEvent, SignalMessage};
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, OrchestratorError>>;

/// Requests from the host, delivered through an [`crate::OrchestratorHandle`].
pub(crate) enum OrchestratorCommand {
    Roster(RosterEvent),

    /// Already decoded signaling message from `from`.
    Signal {
        from: PeerId,
        message: SignalMessage,
    },

    ToggleAudio {
        reply: oneshot::Sender<bool>,
    },
    ToggleVideo {
        reply: oneshot::Sender<bool>,
    },

    StartScreenShare {
        reply: Reply<SwapReport>,
    },
    StopScreenShare {
        reply: Reply<SwapReport>,
    },
    ToggleScreenShare {
        reply: Reply<SwapReport>,
    },

    AcquireCamera {
        constraints: MediaConstraints,
        reply: Reply<LocalMediaStatus>,
    },

    ForceClose {
        peer_id: PeerId,
        reply: Reply<()>,
    },

    SendData {
        peer_id: PeerId,
        data: Bytes,
        reply: Reply<()>,
    },

    Peers {
        reply: oneshot::Sender<Vec<PeerStatus>>,
    },
    Peer {
        peer_id: PeerId,
        reply: oneshot::Sender<Option<PeerStatus>>,
    },
    ConnectedCount {
        reply: oneshot::Sender<usize>,
    },
    LocalMedia {
        reply: oneshot::Sender<LocalMediaStatus>,
    },

    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
