use crate::media::RemoteMedia;
use crate::orchestrator::OrchestratorEvent;
use crate::session::ConnectionId;
use crate::transport::SideChannel;
use bytes::Bytes;
use meshrtc_core::{IceCandidate, PeerId};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Path health as reported by the underlying peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events a transport generates for the orchestrator.
pub enum TransportEvent {
    StateChanged(LinkState),

    /// Local candidate to trickle to the remote side.
    CandidateGenerated(IceCandidate),

    RemoteTrack(RemoteMedia),

    SideChannelReady(Arc<dyn SideChannel>),

    /// Payload received on the side channel.
    Message(Bytes),
}

/// Sender half handed to a [`crate::PeerTransport`]. Every event is tagged
/// with the connection it came from so the orchestrator can drop events of
/// connections it already replaced or closed.
#[derive(Clone)]
pub struct TransportEvents {
    peer_id: PeerId,
    connection: ConnectionId,
    tx: mpsc::Sender<OrchestratorEvent>,
}

impl TransportEvents {
    pub(crate) fn new(
        peer_id: PeerId,
        connection: ConnectionId,
        tx: mpsc::Sender<OrchestratorEvent>,
    ) -> Self {
        Self {
            peer_id,
            connection,
            tx,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Returns `false` once the orchestrator is gone.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(OrchestratorEvent::Transport {
                peer_id: self.peer_id.clone(),
                connection: self.connection,
                event,
            })
            .await
            .is_ok()
    }
}
