use crate::media::{CaptureError, CaptureStream, LocalMediaStatus};
use crate::error::OrchestratorError;
use crate::session::{ConnectionId, DriverOutcome, SessionId};
use crate::transport::TransportEvent;
use meshrtc_core::PeerId;
use tokio::sync::oneshot;

/// Internal completions re-entering the dispatch loop.
pub(crate) enum OrchestratorEvent {
    Transport {
        peer_id: PeerId,
        connection: ConnectionId,
        event: TransportEvent,
    },

    Driver {
        peer_id: PeerId,
        connection: ConnectionId,
        outcome: DriverOutcome,
    },

    GraceExpired {
        peer_id: PeerId,
        session: SessionId,
        timer: u64,
    },

    CameraAcquired {
        result: Result<CaptureStream, CaptureError>,
        reply: oneshot::Sender<Result<LocalMediaStatus, OrchestratorError>>,
    },

    ScreenAcquired {
        result: Result<CaptureStream, CaptureError>,
    },

    /// The OS ended the screen source (e.g. "stop sharing" in the picker bar).
    ScreenEnded {
        track_id: String,
    },
}
