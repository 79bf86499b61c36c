use crate::error::OrchestratorError;
use crate::media::{LocalMediaStatus, MediaConstraints};
use crate::orchestrator::{OrchestratorCommand, SessionEvent, SessionView, SwapReport};
use crate::session::PeerStatus;
use bytes::Bytes;
use meshrtc_core::{PeerId, RosterEvent, SignalMessage};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

/// Cloneable entry point into a running orchestrator.
///
/// Every method round-trips through the dispatch loop and fails with
/// [`OrchestratorError::Closed`] once it has stopped. [`OrchestratorHandle::view`]
/// reads without a round trip.
#[derive(Clone)]
pub struct OrchestratorHandle {
    local_id: PeerId,
    commands: mpsc::Sender<OrchestratorCommand>,
    events: broadcast::Sender<SessionEvent>,
    view: SessionView,
}

impl OrchestratorHandle {
    pub(crate) fn new(
        local_id: PeerId,
        commands: mpsc::Sender<OrchestratorCommand>,
        events: broadcast::Sender<SessionEvent>,
        view: SessionView,
    ) -> Self {
        Self {
            local_id,
            commands,
            events,
            view,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn send(&self, command: OrchestratorCommand) -> Result<(), OrchestratorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| OrchestratorError::Closed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> OrchestratorCommand,
    ) -> Result<T, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx)).await?;
        rx.await.map_err(|_| OrchestratorError::Closed)
    }

    pub async fn roster(&self, event: RosterEvent) -> Result<(), OrchestratorError> {
        self.send(OrchestratorCommand::Roster(event)).await
    }

    /// Decodes a raw `(kind, payload)` pair from the signaling transport.
    /// Unknown kinds and malformed payloads are logged and rejected without
    /// reaching any session.
    pub async fn signal(
        &self,
        from: PeerId,
        kind: &str,
        payload: &Value,
    ) -> Result<(), OrchestratorError> {
        let message = SignalMessage::decode(kind, payload).map_err(|e| {
            warn!("Dropping signaling message from {}: {}", from, e);
            OrchestratorError::from(e)
        })?;
        self.signal_message(from, message).await
    }

    pub async fn signal_message(
        &self,
        from: PeerId,
        message: SignalMessage,
    ) -> Result<(), OrchestratorError> {
        self.send(OrchestratorCommand::Signal { from, message })
            .await
    }

    /// Returns whether the microphone is now enabled.
    pub async fn toggle_audio(&self) -> Result<bool, OrchestratorError> {
        self.request(|reply| OrchestratorCommand::ToggleAudio { reply })
            .await
    }

    /// Returns whether the camera is now enabled.
    pub async fn toggle_video(&self) -> Result<bool, OrchestratorError> {
        self.request(|reply| OrchestratorCommand::ToggleVideo { reply })
            .await
    }

    pub async fn start_screen_share(&self) -> Result<SwapReport, OrchestratorError> {
        self.request(|reply| OrchestratorCommand::StartScreenShare { reply })
            .await?
    }

    pub async fn stop_screen_share(&self) -> Result<SwapReport, OrchestratorError> {
        self.request(|reply| OrchestratorCommand::StopScreenShare { reply })
            .await?
    }

    pub async fn toggle_screen_share(&self) -> Result<SwapReport, OrchestratorError> {
        self.request(|reply| OrchestratorCommand::ToggleScreenShare { reply })
            .await?
    }

    pub async fn acquire_camera(
        &self,
        constraints: MediaConstraints,
    ) -> Result<LocalMediaStatus, OrchestratorError> {
        self.request(|reply| OrchestratorCommand::AcquireCamera { constraints, reply })
            .await?
    }

    /// Closes the session with `peer_id` without waiting for a grace period.
    pub async fn force_close(&self, peer_id: PeerId) -> Result<(), OrchestratorError> {
        self.request(|reply| OrchestratorCommand::ForceClose { peer_id, reply })
            .await?
    }

    /// Sends `data` over the side channel to `peer_id`.
    pub async fn send_data(
        &self,
        peer_id: PeerId,
        data: impl Into<Bytes>,
    ) -> Result<(), OrchestratorError> {
        let data = data.into();
        self.request(|reply| OrchestratorCommand::SendData {
            peer_id,
            data,
            reply,
        })
        .await?
    }

    pub async fn peers(&self) -> Result<Vec<PeerStatus>, OrchestratorError> {
        self.request(|reply| OrchestratorCommand::Peers { reply })
            .await
    }

    pub async fn peer(&self, peer_id: PeerId) -> Result<Option<PeerStatus>, OrchestratorError> {
        self.request(|reply| OrchestratorCommand::Peer { peer_id, reply })
            .await
    }

    pub async fn connected_count(&self) -> Result<usize, OrchestratorError> {
        self.request(|reply| OrchestratorCommand::ConnectedCount { reply })
            .await
    }

    pub async fn local_media(&self) -> Result<LocalMediaStatus, OrchestratorError> {
        self.request(|reply| OrchestratorCommand::LocalMedia { reply })
            .await
    }

    /// Closes every session and releases local media. Resolves once the
    /// dispatch loop has stopped.
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        self.request(|reply| OrchestratorCommand::Shutdown { reply })
            .await
    }
}
