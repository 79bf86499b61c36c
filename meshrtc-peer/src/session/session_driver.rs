use crate::error::OrchestratorError;
use crate::media::LocalTrack;
use crate::orchestrator::{OrchestratorEvent, SwapId};
use crate::session::ConnectionId;
use crate::transport::{PeerTransport, SdpKind, SideChannel, TransportEvents, TransportFactory};
use anyhow::Context;
use bytes::Bytes;
use meshrtc_core::{IceCandidate, PeerId, TrackKind};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Transport work queued by the dispatch loop for one connection.
pub(crate) enum SessionOp {
    AttachTracks {
        audio: Option<LocalTrack>,
        video: Option<LocalTrack>,
    },
    CreateOffer,
    /// Apply the remote offer, then create our answer.
    AcceptOffer {
        sdp: String,
    },
    AcceptAnswer {
        sdp: String,
    },
    ApplyCandidates(Vec<IceCandidate>),
    ReplaceTrack {
        kind: TrackKind,
        track: Option<LocalTrack>,
        swap: Option<SwapId>,
    },
    SendData {
        channel: Arc<dyn SideChannel>,
        data: Bytes,
        reply: oneshot::Sender<Result<(), OrchestratorError>>,
    },
}

/// Completion of a [`SessionOp`], reported back to the dispatch loop.
pub(crate) enum DriverOutcome {
    OfferCreated(String),
    AnswerCreated(String),
    AnswerApplied,
    TrackReplaced {
        kind: TrackKind,
        track_id: Option<String>,
        swap: Option<SwapId>,
        result: Result<(), String>,
    },
    /// Non-fatal failure; the session keeps going.
    Degraded(String),
    /// Negotiation cannot continue on this connection.
    Failed(anyhow::Error),
}

/// Handle to the task that owns one connection object.
///
/// Ops run strictly in submission order. Shutting the driver down interrupts
/// the op in flight, drops the queue and closes the connection.
pub(crate) struct SessionDriver {
    connection: ConnectionId,
    ops: mpsc::UnboundedSender<SessionOp>,
    close: Option<oneshot::Sender<()>>,
}

impl SessionDriver {
    pub(crate) fn spawn(
        peer_id: PeerId,
        connection: ConnectionId,
        factory: Arc<dyn TransportFactory>,
        events: mpsc::Sender<OrchestratorEvent>,
    ) -> Self {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(drive(peer_id, connection, factory, ops_rx, close_rx, events));

        Self {
            connection,
            ops: ops_tx,
            close: Some(close_tx),
        }
    }

    pub(crate) fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub(crate) fn submit(&self, op: SessionOp) {
        if self.ops.send(op).is_err() {
            debug!("Driver for {} is gone, op dropped", self.connection);
        }
    }

    pub(crate) fn shutdown(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn drive(
    peer_id: PeerId,
    connection: ConnectionId,
    factory: Arc<dyn TransportFactory>,
    mut ops: mpsc::UnboundedReceiver<SessionOp>,
    mut close: oneshot::Receiver<()>,
    events: mpsc::Sender<OrchestratorEvent>,
) {
    let transport_events = TransportEvents::new(peer_id.clone(), connection, events.clone());

    let created = tokio::select! {
        biased;
        _ = &mut close => return,
        created = factory.create(peer_id.clone(), transport_events) => created,
    };

    let transport = match created {
        Ok(transport) => transport,
        Err(e) => {
            let outcome = DriverOutcome::Failed(e.context("failed to create peer connection"));
            report(&events, &peer_id, connection, outcome).await;
            return;
        }
    };
    debug!("Connection {} to {} created", connection, peer_id);

    loop {
        let op = tokio::select! {
            biased;
            _ = &mut close => break,
            op = ops.recv() => match op {
                Some(op) => op,
                None => break,
            },
        };

        let outcome = tokio::select! {
            biased;
            _ = &mut close => break,
            outcome = execute(&peer_id, transport.as_ref(), op) => outcome,
        };

        if let Some(outcome) = outcome {
            if !report(&events, &peer_id, connection, outcome).await {
                break;
            }
        }
    }

    if let Err(e) = transport.close().await {
        warn!("Failed to close connection {} to {}: {:?}", connection, peer_id, e);
    }
    debug!("Connection {} to {} released", connection, peer_id);
}

async fn report(
    events: &mpsc::Sender<OrchestratorEvent>,
    peer_id: &PeerId,
    connection: ConnectionId,
    outcome: DriverOutcome,
) -> bool {
    events
        .send(OrchestratorEvent::Driver {
            peer_id: peer_id.clone(),
            connection,
            outcome,
        })
        .await
        .is_ok()
}

async fn execute(
    peer_id: &PeerId,
    transport: &dyn PeerTransport,
    op: SessionOp,
) -> Option<DriverOutcome> {
    match op {
        SessionOp::AttachTracks { audio, video } => transport
            .attach_tracks(audio.as_ref(), video.as_ref())
            .await
            .err()
            .map(|e| DriverOutcome::Degraded(format!("failed to attach local tracks: {e:#}"))),

        SessionOp::CreateOffer => Some(match transport.create_offer().await {
            Ok(sdp) => DriverOutcome::OfferCreated(sdp),
            Err(e) => DriverOutcome::Failed(e.context("failed to create offer")),
        }),

        SessionOp::AcceptOffer { sdp } => {
            let answer = async {
                transport
                    .set_remote_description(SdpKind::Offer, sdp)
                    .await
                    .context("failed to apply remote offer")?;
                transport
                    .create_answer()
                    .await
                    .context("failed to create answer")
            }
            .await;

            Some(match answer {
                Ok(sdp) => DriverOutcome::AnswerCreated(sdp),
                Err(e) => DriverOutcome::Failed(e),
            })
        }

        SessionOp::AcceptAnswer { sdp } => Some(
            match transport.set_remote_description(SdpKind::Answer, sdp).await {
                Ok(()) => DriverOutcome::AnswerApplied,
                Err(e) => DriverOutcome::Failed(e.context("failed to apply remote answer")),
            },
        ),

        SessionOp::ApplyCandidates(candidates) => {
            let total = candidates.len();
            let mut failures = Vec::new();
            for candidate in candidates {
                if let Err(e) = transport.add_ice_candidate(candidate).await {
                    failures.push(format!("{e:#}"));
                }
            }
            debug!(
                "Applied {}/{} candidates from {}",
                total - failures.len(),
                total,
                peer_id
            );

            (!failures.is_empty()).then(|| {
                DriverOutcome::Degraded(format!(
                    "failed to add {} candidate(s): {}",
                    failures.len(),
                    failures.join("; ")
                ))
            })
        }

        SessionOp::ReplaceTrack { kind, track, swap } => {
            let track_id = track.as_ref().map(|t| t.id().to_owned());
            let result = transport
                .replace_track(kind, track.as_ref())
                .await
                .map_err(|e| format!("{e:#}"));
            Some(DriverOutcome::TrackReplaced {
                kind,
                track_id,
                swap,
                result,
            })
        }

        SessionOp::SendData {
            channel,
            data,
            reply,
        } => {
            let result = channel
                .send(data)
                .await
                .map_err(|e| OrchestratorError::DataSendFailed {
                    peer_id: peer_id.clone(),
                    reason: format!("{e:#}"),
                });
            let _ = reply.send(result);
            None
        }
    }
}
