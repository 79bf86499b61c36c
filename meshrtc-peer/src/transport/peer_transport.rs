use crate::media::LocalTrack;
use crate::transport::TransportEvents;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use meshrtc_core::{IceCandidate, PeerId, TrackKind};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// One connection object toward a single remote participant.
///
/// Implementations report asynchronous happenings (gathered candidates, path
/// health, remote tracks, side channel) through the [`TransportEvents`] they
/// were created with.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Adds the outgoing senders. A missing track still reserves a sender so
    /// it can be filled later by [`PeerTransport::replace_track`].
    async fn attach_tracks(
        &self,
        audio: Option<&LocalTrack>,
        video: Option<&LocalTrack>,
    ) -> Result<()>;

    /// Creates an offer and sets it as the local description.
    async fn create_offer(&self) -> Result<String>;

    /// Creates an answer and sets it as the local description.
    async fn create_answer(&self) -> Result<String>;

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Swaps the track behind the existing sender of `kind` without
    /// renegotiating.
    async fn replace_track(&self, kind: TrackKind, track: Option<&LocalTrack>) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Builds a fresh [`PeerTransport`] per session (and per glare restart).
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        peer_id: PeerId,
        events: TransportEvents,
    ) -> Result<Arc<dyn PeerTransport>>;
}

/// Reliable in-call data channel to one participant.
#[async_trait]
pub trait SideChannel: Send + Sync {
    fn label(&self) -> String;

    async fn send(&self, data: Bytes) -> Result<()>;
}
