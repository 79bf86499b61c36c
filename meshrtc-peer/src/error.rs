use crate::media::CaptureError;
use meshrtc_core::{PeerId, ProtocolError};
use thiserror::Error;

/// Failures surfaced by the orchestrator and its handle.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    /// Camera, microphone or screen acquisition failed.
    #[error("media device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The user dismissed the screen picker.
    #[error("screen share cancelled")]
    ShareCancelled,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Stale, duplicate or out-of-order offer/answer. Logged and discarded.
    #[error("negotiation conflict with {peer_id}: {reason}")]
    NegotiationConflict { peer_id: PeerId, reason: String },

    /// Transient path loss; only recorded while the grace period runs.
    #[error("connectivity lost with {0}")]
    ConnectivityLoss(PeerId),

    #[error("session with {peer_id} failed: {reason}")]
    SessionFailed { peer_id: PeerId, reason: String },

    #[error("no session for peer {0}")]
    UnknownPeer(PeerId),

    #[error("side channel to {0} is not open")]
    SideChannelUnavailable(PeerId),

    #[error("failed to send data to {peer_id}: {reason}")]
    DataSendFailed { peer_id: PeerId, reason: String },

    #[error("orchestrator is shut down")]
    Closed,
}

impl From<CaptureError> for OrchestratorError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Cancelled => Self::ShareCancelled,
            other => Self::DeviceUnavailable(other.to_string()),
        }
    }
}
