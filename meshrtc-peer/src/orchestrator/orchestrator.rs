use crate::error::OrchestratorError;
use crate::media::{
    CaptureDevice, CaptureError, CaptureStream, LocalMediaStatus, LocalTrack, MediaSourceManager,
    RenderSink, ScreenConstraints,
};
use crate::orchestrator::{
    OrchestratorCommand, OrchestratorConfig, OrchestratorEvent, OrchestratorHandle, PendingSwap,
    SessionEvent, SessionView, SwapId, SwapReply, SwapReport,
};
use crate::session::{
    CandidateDisposition, CloseReason, ConnectionId, DriverOutcome, PeerSession,
    RemoteMediaStatus, SessionDriver, SessionId, SessionState,
};
use crate::signaling::SignalingOutput;
use crate::transport::{LinkState, RtcTransportFactory, TransportEvent, TransportFactory};
use anyhow::Context;
use meshrtc_core::{IceCandidate, OutgoingKind, PeerId, RosterEvent, SignalMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// External systems the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub transports: Arc<dyn TransportFactory>,
    pub signaling: Arc<dyn SignalingOutput>,
    pub capture: Arc<dyn CaptureDevice>,
    pub sink: Arc<dyn RenderSink>,
}

impl Collaborators {
    /// Peer connections backed by webrtc-rs, configured from `config.transport`.
    pub fn with_rtc(
        config: &OrchestratorConfig,
        signaling: Arc<dyn SignalingOutput>,
        capture: Arc<dyn CaptureDevice>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            transports: Arc::new(RtcTransportFactory::new(config.transport.clone())),
            signaling,
            capture,
            sink,
        }
    }
}

/// Owns every [`PeerSession`] of the local participant and serializes all
/// changes to them on one dispatch loop.
pub struct Orchestrator {
    local_id: PeerId,
    config: OrchestratorConfig,
    collaborators: Collaborators,
    sessions: HashMap<PeerId, PeerSession>,
    media: MediaSourceManager,
    command_rx: mpsc::Receiver<OrchestratorCommand>,
    event_rx: mpsc::Receiver<OrchestratorEvent>,
    event_tx: mpsc::Sender<OrchestratorEvent>,
    session_events: broadcast::Sender<SessionEvent>,
    view: SessionView,
    /// Device acquisitions and screen-end watchers.
    background: JoinSet<()>,
    swaps: HashMap<SwapId, PendingSwap>,
    screen_requests: Vec<SwapReply>,
    screen_acquiring: bool,
    screen_cancelled: bool,
    connected_count: usize,
    next_id: u64,
    stopped: bool,
}

impl Orchestrator {
    pub fn new(
        local_id: PeerId,
        config: OrchestratorConfig,
        collaborators: Collaborators,
    ) -> (Self, OrchestratorHandle) {
        // Tokio channels panic on a zero capacity.
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (session_events, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let view = SessionView::new();

        let handle = OrchestratorHandle::new(
            local_id.clone(),
            command_tx,
            session_events.clone(),
            view.clone(),
        );

        let orchestrator = Self {
            local_id,
            config,
            collaborators,
            sessions: HashMap::new(),
            media: MediaSourceManager::new(),
            command_rx,
            event_rx,
            event_tx,
            session_events,
            view,
            background: JoinSet::new(),
            swaps: HashMap::new(),
            screen_requests: Vec::new(),
            screen_acquiring: false,
            screen_cancelled: false,
            connected_count: 0,
            next_id: 0,
            stopped: false,
        };

        (orchestrator, handle)
    }

    /// Starts the dispatch loop on the current runtime.
    pub fn spawn(
        local_id: PeerId,
        config: OrchestratorConfig,
        collaborators: Collaborators,
    ) -> OrchestratorHandle {
        let (orchestrator, handle) = Self::new(local_id, config, collaborators);
        tokio::spawn(orchestrator.run());
        handle
    }

    pub async fn run(mut self) {
        info!("Orchestrator for {} started", self.local_id);

        while !self.stopped {
            tokio::select! {
                biased;

                Some(event) = self.event_rx.recv() => self.handle_event(event).await,

                Some(_) = self.background.join_next(), if !self.background.is_empty() => {}

                cmd = self.command_rx.recv() => match cmd {
                    Some(c) => self.handle_command(c).await,
                    None => {
                        info!("Command channel closed. Shutting down orchestrator.");
                        self.shutdown();
                    }
                },
            }
        }

        info!("Orchestrator for {} finished", self.local_id);
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn spawn_driver(&mut self, peer_id: &PeerId) -> SessionDriver {
        let connection = ConnectionId(self.next_id());
        SessionDriver::spawn(
            peer_id.clone(),
            connection,
            self.collaborators.transports.clone(),
            self.event_tx.clone(),
        )
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.session_events.send(event);
    }

    fn emit_state(&self, peer_id: &PeerId) {
        if let Some(session) = self.sessions.get(peer_id) {
            self.emit(SessionEvent::PeerStateChanged {
                peer_id: peer_id.clone(),
                session_id: session.session_id(),
                state: session.state(),
            });
        }
    }

    /// Publishes the session's status to the view and refreshes the
    /// connected count.
    fn sync(&mut self, peer_id: &PeerId) {
        if let Some(session) = self.sessions.get(peer_id) {
            self.view.upsert(session.status());
        }
        self.refresh_connected_count();
    }

    fn refresh_connected_count(&mut self) {
        let count = self
            .sessions
            .values()
            .filter(|s| s.state() == SessionState::Connected)
            .count();
        if count != self.connected_count {
            self.connected_count = count;
            self.view.set_connected_count(count);
            self.emit(SessionEvent::ConnectedCountChanged(count));
        }
    }

    fn insert_session(&mut self, session: PeerSession) {
        let peer_id = session.peer_id().clone();
        self.sessions.insert(peer_id.clone(), session);
        self.emit_state(&peer_id);
        self.sync(&peer_id);
    }

    fn conflict(peer_id: &PeerId, reason: impl Into<String>) {
        let error = OrchestratorError::NegotiationConflict {
            peer_id: peer_id.clone(),
            reason: reason.into(),
        };
        warn!("Discarding signaling message: {}", error);
    }

    async fn send_signal(&self, peer_id: &PeerId, message: SignalMessage) -> anyhow::Result<()> {
        let kind = message.kind();
        self.collaborators
            .signaling
            .send(peer_id, message)
            .await
            .with_context(|| format!("failed to send {} to {}", kind, peer_id))
    }

    /// Best-effort send; failures are only logged.
    async fn notify(&self, peer_id: &PeerId, message: SignalMessage) {
        if let Err(e) = self.send_signal(peer_id, message).await {
            warn!("{:#}", e);
        }
    }

    async fn send_candidates(&self, peer_id: &PeerId, candidates: Vec<IceCandidate>) {
        for candidate in candidates {
            self.notify(peer_id, SignalMessage::Candidate { candidate })
                .await;
        }
    }

    /// Sends `message` to every peer that already holds a session for us.
    async fn broadcast_status(&self, message: SignalMessage) {
        for (peer_id, session) in &self.sessions {
            if session.state().knows_counterpart() {
                self.notify(peer_id, message.clone()).await;
            }
        }
    }

    fn status_trio(&self) -> [SignalMessage; 3] {
        [
            SignalMessage::AudioStatus {
                has_audio: self.media.audio_enabled(),
            },
            SignalMessage::VideoStatus {
                has_video: self.media.video_enabled(),
            },
            SignalMessage::ShareStatus {
                is_sharing: self.media.is_sharing(),
            },
        ]
    }

    async fn handle_command(&mut self, cmd: OrchestratorCommand) {
        match cmd {
            OrchestratorCommand::Roster(event) => self.handle_roster(event),

            OrchestratorCommand::Signal { from, message } => {
                self.handle_signal(from, message).await
            }

            OrchestratorCommand::ToggleAudio { reply } => {
                let enabled = self.media.toggle_audio();
                info!("Local audio {}", if enabled { "unmuted" } else { "muted" });
                self.broadcast_status(SignalMessage::AudioStatus { has_audio: enabled })
                    .await;
                self.emit(SessionEvent::LocalMediaChanged(self.media.status()));
                let _ = reply.send(enabled);
            }

            OrchestratorCommand::ToggleVideo { reply } => {
                let enabled = self.media.toggle_video();
                info!("Local video {}", if enabled { "enabled" } else { "disabled" });
                self.broadcast_status(SignalMessage::VideoStatus { has_video: enabled })
                    .await;
                self.emit(SessionEvent::LocalMediaChanged(self.media.status()));
                let _ = reply.send(enabled);
            }

            OrchestratorCommand::StartScreenShare { reply } => self.start_screen_share(reply),

            OrchestratorCommand::StopScreenShare { reply } => {
                self.stop_screen_share(Some(reply)).await
            }

            OrchestratorCommand::ToggleScreenShare { reply } => {
                if self.media.is_sharing() || self.screen_acquiring {
                    self.stop_screen_share(Some(reply)).await;
                } else {
                    self.start_screen_share(reply);
                }
            }

            OrchestratorCommand::AcquireCamera { constraints, reply } => {
                let capture = self.collaborators.capture.clone();
                let tx = self.event_tx.clone();
                self.background.spawn(async move {
                    let result = capture.open_camera(&constraints).await;
                    let _ = tx
                        .send(OrchestratorEvent::CameraAcquired { result, reply })
                        .await;
                });
            }

            OrchestratorCommand::ForceClose { peer_id, reply } => {
                let result = if self.sessions.contains_key(&peer_id) {
                    self.close_session(&peer_id, CloseReason::ForceClosed);
                    Ok(())
                } else {
                    Err(OrchestratorError::UnknownPeer(peer_id))
                };
                let _ = reply.send(result);
            }

            OrchestratorCommand::SendData {
                peer_id,
                data,
                reply,
            } => match self.sessions.get(&peer_id) {
                Some(session) => session.send_data(data, reply),
                None => {
                    let _ = reply.send(Err(OrchestratorError::UnknownPeer(peer_id)));
                }
            },

            OrchestratorCommand::Peers { reply } => {
                let mut peers: Vec<_> = self.sessions.values().map(PeerSession::status).collect();
                peers.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
                let _ = reply.send(peers);
            }

            OrchestratorCommand::Peer { peer_id, reply } => {
                let _ = reply.send(self.sessions.get(&peer_id).map(PeerSession::status));
            }

            OrchestratorCommand::ConnectedCount { reply } => {
                let _ = reply.send(self.connected_count);
            }

            OrchestratorCommand::LocalMedia { reply } => {
                let _ = reply.send(self.media.status());
            }

            OrchestratorCommand::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
            }
        }
    }

    fn handle_roster(&mut self, event: RosterEvent) {
        match event {
            RosterEvent::ParticipantJoined { id } => self.on_participant_joined(id),
            RosterEvent::ParticipantLeft { id } => self.close_session(&id, CloseReason::Left),
            RosterEvent::ParticipantKicked { id } if id == self.local_id => {
                warn!("Local participant {} was kicked", id);
                self.emit(SessionEvent::LocalKicked);
                self.shutdown();
            }
            RosterEvent::ParticipantKicked { id } => self.close_session(&id, CloseReason::Kicked),
        }
    }

    fn on_participant_joined(&mut self, peer_id: PeerId) {
        if peer_id == self.local_id {
            debug!("Ignoring our own join");
            return;
        }

        if let Some(existing) = self.sessions.get(&peer_id) {
            if existing.state() != SessionState::Disconnected {
                debug!(
                    "{} joined but session {} is still {:?}",
                    peer_id,
                    existing.session_id(),
                    existing.state()
                );
                return;
            }
            self.close_session(&peer_id, CloseReason::Replaced);
        }

        let session_id = SessionId(self.next_id());
        let driver = self.spawn_driver(&peer_id);
        info!("Initiating session {} with {}", session_id, peer_id);

        let session = PeerSession::initiate(
            peer_id,
            session_id,
            driver,
            self.media.outgoing_audio(),
            self.media.outgoing_video(),
        );
        self.insert_session(session);
    }

    async fn handle_signal(&mut self, from: PeerId, message: SignalMessage) {
        if from == self.local_id {
            warn!("Dropping {} addressed from ourselves", message.kind());
            return;
        }
        if let Some(session) = self.sessions.get_mut(&from) {
            session.touch();
        }

        match message {
            SignalMessage::Offer { sdp, media_kind } => self.on_offer(&from, sdp, media_kind),
            SignalMessage::Answer { sdp, media_kind } => self.on_answer(&from, sdp, media_kind),
            SignalMessage::Candidate { candidate } => self.on_remote_candidate(&from, candidate),
            SignalMessage::VideoStatus { has_video } => {
                self.update_remote_media(&from, |m| m.has_video = has_video)
            }
            SignalMessage::AudioStatus { has_audio } => {
                self.update_remote_media(&from, |m| m.has_audio = has_audio)
            }
            SignalMessage::ShareStatus { is_sharing } => {
                self.update_remote_media(&from, |m| m.is_sharing = is_sharing)
            }
        }

        self.sync(&from);
    }

    fn on_offer(&mut self, from: &PeerId, sdp: String, media_kind: OutgoingKind) {
        match self.sessions.get(from).map(PeerSession::state) {
            None => {
                let session_id = SessionId(self.next_id());
                let driver = self.spawn_driver(from);
                info!("Answering offer from {} in session {}", from, session_id);

                let session = PeerSession::respond(
                    from.clone(),
                    session_id,
                    driver,
                    self.media.outgoing_audio(),
                    self.media.outgoing_video(),
                    sdp,
                );
                self.insert_session(session);
            }

            // Glare: the smaller id gives up its own offer.
            Some(SessionState::Offering) if self.local_id < *from => {
                info!("Glare with {}: yielding and answering their offer", from);
                let driver = self.spawn_driver(from);
                let audio = self.media.outgoing_audio();
                let video = self.media.outgoing_video();
                if let Some(session) = self.sessions.get_mut(from) {
                    session.yield_to_offer(driver, audio, video, sdp);
                }
                self.emit_state(from);
            }

            Some(SessionState::Offering) => {
                Self::conflict(from, "glare, keeping our own offer");
                if let Some(session) = self.sessions.get_mut(from) {
                    session.drop_stray_offer();
                }
                return;
            }

            Some(state) => {
                Self::conflict(from, format!("offer while {:?}", state));
                return;
            }
        }

        self.update_remote_media(from, |m| {
            m.is_sharing = media_kind == OutgoingKind::Screen
        });
    }

    fn on_answer(&mut self, from: &PeerId, sdp: String, media_kind: OutgoingKind) {
        let Some(session) = self.sessions.get_mut(from) else {
            Self::conflict(from, "answer without a session");
            return;
        };

        match session.accept_answer(sdp) {
            Ok(()) => {
                debug!("Applying answer from {}", from);
                self.update_remote_media(from, |m| {
                    m.is_sharing = media_kind == OutgoingKind::Screen
                });
            }
            Err(reason) => Self::conflict(from, reason),
        }
    }

    fn on_remote_candidate(&mut self, from: &PeerId, candidate: IceCandidate) {
        let Some(session) = self.sessions.get_mut(from) else {
            debug!("Dropping candidate from {}: no session", from);
            return;
        };

        match session.push_remote_candidate(candidate) {
            CandidateDisposition::Buffered => debug!(
                "Buffered candidate from {} ({} waiting)",
                from,
                session.buffered_candidates()
            ),
            CandidateDisposition::Applied => debug!("Applying candidate from {}", from),
            CandidateDisposition::Discarded => {
                debug!("Discarded candidate from {} following a dropped offer", from)
            }
        }
    }

    fn update_remote_media(&mut self, peer_id: &PeerId, update: impl FnOnce(&mut RemoteMediaStatus)) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            debug!("Dropping media status from {}: no session", peer_id);
            return;
        };

        let before = *session.remote_media_mut();
        update(session.remote_media_mut());
        let status = *session.remote_media_mut();

        if status != before {
            self.emit(SessionEvent::RemoteMediaChanged {
                peer_id: peer_id.clone(),
                status,
            });
        }
    }

    async fn handle_event(&mut self, event: OrchestratorEvent) {
        match event {
            OrchestratorEvent::Transport {
                peer_id,
                connection,
                event,
            } => {
                if !self.is_current(&peer_id, connection) {
                    debug!("Ignoring event from stale connection {} of {}", connection, peer_id);
                    return;
                }
                self.on_transport_event(&peer_id, event).await;
                self.sync(&peer_id);
            }

            OrchestratorEvent::Driver {
                peer_id,
                connection,
                outcome,
            } => {
                if !self.is_current(&peer_id, connection) {
                    debug!("Ignoring outcome from stale connection {} of {}", connection, peer_id);
                    return;
                }
                self.on_driver_outcome(&peer_id, outcome).await;
                self.sync(&peer_id);
            }

            OrchestratorEvent::GraceExpired {
                peer_id,
                session,
                timer,
            } => self.on_grace_expired(&peer_id, session, timer),

            OrchestratorEvent::CameraAcquired { result, reply } => {
                let _ = reply.send(self.on_camera_acquired(result));
            }

            OrchestratorEvent::ScreenAcquired { result } => self.on_screen_acquired(result).await,

            OrchestratorEvent::ScreenEnded { track_id } => {
                if self.media.is_sharing() && self.media.screen_track_id() == Some(track_id.as_str()) {
                    info!("Screen source ended, stopping share");
                    self.stop_screen_share(None).await;
                }
            }
        }
    }

    fn is_current(&self, peer_id: &PeerId, connection: ConnectionId) -> bool {
        self.sessions
            .get(peer_id)
            .is_some_and(|s| s.connection() == connection)
    }

    async fn on_transport_event(&mut self, peer_id: &PeerId, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(link) => self.on_link_state(peer_id, link).await,

            TransportEvent::CandidateGenerated(candidate) => {
                let ready = self
                    .sessions
                    .get_mut(peer_id)
                    .and_then(|s| s.queue_local_candidate(candidate));
                if let Some(candidate) = ready {
                    self.send_candidates(peer_id, vec![candidate]).await;
                }
            }

            TransportEvent::RemoteTrack(media) => {
                info!("Remote {:?} track {} from {}", media.kind, media.track_id, peer_id);
                let track_id = media.track_id.clone();
                let kind = media.kind;
                self.collaborators.sink.attach(peer_id, media);
                self.emit(SessionEvent::RemoteTrack {
                    peer_id: peer_id.clone(),
                    track_id,
                    kind,
                });
            }

            TransportEvent::SideChannelReady(channel) => {
                info!("Side channel '{}' to {} ready", channel.label(), peer_id);
                if let Some(session) = self.sessions.get_mut(peer_id) {
                    session.set_side_channel(channel);
                }
            }

            TransportEvent::Message(data) => {
                if let Some(session) = self.sessions.get_mut(peer_id) {
                    session.touch();
                }
                self.emit(SessionEvent::DataReceived {
                    peer_id: peer_id.clone(),
                    data,
                });
            }
        }
    }

    async fn on_link_state(&mut self, peer_id: &PeerId, link: LinkState) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        session.set_link_up(link == LinkState::Connected);
        let state = session.state();

        match link {
            LinkState::Connected => match state {
                SessionState::Connecting | SessionState::Disconnected => {
                    self.mark_connected(peer_id).await
                }
                // Promoted once Connecting is entered.
                _ => debug!("{} reported a healthy path while {:?}", peer_id, state),
            },
            LinkState::Disconnected if state.accepts_hot_swap() => self.mark_disconnected(peer_id),
            LinkState::Disconnected => {
                debug!("{} reported path loss while {:?}", peer_id, state)
            }
            LinkState::Failed | LinkState::Closed => self.close_session(
                peer_id,
                CloseReason::Failed(format!("transport reported {:?}", link).to_lowercase()),
            ),
        }
    }

    async fn mark_connected(&mut self, peer_id: &PeerId) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        let previous = session.state();
        if let Err(e) = session.transition(SessionState::Connected) {
            warn!("Session with {}: {}", peer_id, e);
            return;
        }
        session.cancel_grace();
        session.touch();
        let session_id = session.session_id();

        if previous == SessionState::Disconnected {
            info!("Session {} with {} recovered", session_id, peer_id);
        }
        self.emit_state(peer_id);
        self.emit(SessionEvent::PeerConnected {
            peer_id: peer_id.clone(),
            session_id,
        });

        for message in self.status_trio() {
            self.notify(peer_id, message).await;
        }
    }

    fn mark_disconnected(&mut self, peer_id: &PeerId) {
        let timer = self.next_id();
        let grace = self.config.grace_period();
        let tx = self.event_tx.clone();

        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        if let Err(e) = session.transition(SessionState::Disconnected) {
            warn!("Session with {}: {}", peer_id, e);
            return;
        }
        session.record_error(OrchestratorError::ConnectivityLoss(peer_id.clone()).to_string());
        let session_id = session.session_id();

        let expired = peer_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx
                .send(OrchestratorEvent::GraceExpired {
                    peer_id: expired,
                    session: session_id,
                    timer,
                })
                .await;
        });
        session.start_grace(timer, handle);

        info!(
            "Session {} with {} disconnected, closing in {:?} unless it recovers",
            session_id, peer_id, grace
        );
        self.emit_state(peer_id);
        self.emit(SessionEvent::PeerDisconnected {
            peer_id: peer_id.clone(),
            session_id,
        });
    }

    fn on_grace_expired(&mut self, peer_id: &PeerId, session_id: SessionId, timer: u64) {
        let expired = self.sessions.get(peer_id).is_some_and(|s| {
            s.session_id() == session_id
                && s.state() == SessionState::Disconnected
                && s.grace_timer_is(timer)
        });
        if !expired {
            debug!("Ignoring stale grace timer for {}", peer_id);
            return;
        }

        warn!("Grace period for {} expired", peer_id);
        self.close_session(peer_id, CloseReason::GraceExpired);
    }

    async fn on_driver_outcome(&mut self, peer_id: &PeerId, outcome: DriverOutcome) {
        match outcome {
            DriverOutcome::OfferCreated(sdp) => {
                let offer = SignalMessage::Offer {
                    sdp,
                    media_kind: self.media.active(),
                };
                if let Err(e) = self.send_signal(peer_id, offer).await {
                    error!("{:#}", e);
                    self.close_session(peer_id, CloseReason::Failed(format!("{e:#}")));
                    return;
                }
                info!("Offer sent to {}", peer_id);

                let held = self
                    .sessions
                    .get_mut(peer_id)
                    .map(PeerSession::offer_sent)
                    .unwrap_or_default();
                self.send_candidates(peer_id, held).await;
            }

            DriverOutcome::AnswerCreated(sdp) => {
                let answer = SignalMessage::Answer {
                    sdp,
                    media_kind: self.media.active(),
                };
                if let Err(e) = self.send_signal(peer_id, answer).await {
                    error!("{:#}", e);
                    self.close_session(peer_id, CloseReason::Failed(format!("{e:#}")));
                    return;
                }
                info!("Answer sent to {}", peer_id);

                let held = self
                    .sessions
                    .get_mut(peer_id)
                    .map(PeerSession::answer_sent)
                    .unwrap_or_default();
                self.send_candidates(peer_id, held).await;
                self.enter_connecting(peer_id).await;
            }

            DriverOutcome::AnswerApplied => self.enter_connecting(peer_id).await,

            DriverOutcome::TrackReplaced {
                kind,
                track_id,
                swap,
                result,
            } => {
                if let Some(session) = self.sessions.get_mut(peer_id) {
                    let wanted = self.media.outgoing(kind);
                    let wanted_id = wanted.as_ref().map(LocalTrack::id);
                    match &result {
                        Ok(()) => {
                            session.track_replaced(kind, track_id);
                            // A newer swap skipped this sender while this
                            // replace was still queued.
                            if session.state().accepts_hot_swap()
                                && session.attached_track(kind) != wanted_id
                            {
                                self.media.catch_up(session);
                            }
                        }
                        Err(e) => {
                            if session.attached_track(kind) != wanted_id {
                                // The kept source may already be stopped, e.g.
                                // an ended screen track after a share stopped.
                                warn!(
                                    "{} keeps a stale {:?} source {:?}: {}",
                                    peer_id,
                                    kind,
                                    session.attached_track(kind),
                                    e
                                );
                            } else {
                                warn!("Keeping previous {:?} source for {}: {}", kind, peer_id, e);
                            }
                            session.record_error(format!("failed to replace {:?} track: {}", kind, e));
                        }
                    }
                }
                if let Some(swap) = swap {
                    self.settle_swap(swap, peer_id, result);
                }
            }

            DriverOutcome::Degraded(reason) => {
                warn!("Session with {} degraded: {}", peer_id, reason);
                if let Some(session) = self.sessions.get_mut(peer_id) {
                    session.record_error(reason);
                }
            }

            DriverOutcome::Failed(e) => {
                error!("Negotiation with {} failed: {:#}", peer_id, e);
                self.close_session(peer_id, CloseReason::Failed(format!("{e:#}")));
            }
        }
    }

    /// Remote description is applied on both ends of this session.
    async fn enter_connecting(&mut self, peer_id: &PeerId) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        if let Err(e) = session.enter_connecting() {
            warn!("Session with {}: {}", peer_id, e);
            return;
        }
        self.media.catch_up(session);
        let link_up = session.link_up();

        self.emit_state(peer_id);
        if link_up {
            self.mark_connected(peer_id).await;
        }
    }

    fn close_session(&mut self, peer_id: &PeerId, reason: CloseReason) {
        let Some(session) = self.sessions.remove(peer_id) else {
            debug!("No session with {} to close", peer_id);
            return;
        };
        let status = session.close();

        if reason.is_failure() {
            let detail = match &reason {
                CloseReason::Failed(detail) => detail.clone(),
                _ => "grace period expired".to_owned(),
            };
            warn!("Closing session {} with {}: {}", status.session_id, peer_id, detail);
            self.emit(SessionEvent::Error {
                peer_id: Some(peer_id.clone()),
                error: OrchestratorError::SessionFailed {
                    peer_id: peer_id.clone(),
                    reason: detail,
                },
            });
        } else {
            info!("Closing session {} with {} ({:?})", status.session_id, peer_id, reason);
        }

        self.collaborators.sink.detach(peer_id);
        self.view.remove(peer_id);
        self.emit(SessionEvent::PeerStateChanged {
            peer_id: peer_id.clone(),
            session_id: status.session_id,
            state: status.state,
        });
        self.emit(SessionEvent::PeerClosed {
            peer_id: peer_id.clone(),
            session_id: status.session_id,
            reason,
        });

        self.abandon_swaps(peer_id);
        self.refresh_connected_count();
    }

    fn start_screen_share(&mut self, reply: SwapReply) {
        if self.media.is_sharing() {
            debug!("Already sharing the screen");
            let _ = reply.send(Ok(SwapReport::new(OutgoingKind::Screen)));
            return;
        }

        self.screen_requests.push(reply);
        self.screen_cancelled = false;
        if self.screen_acquiring {
            debug!("Joining screen acquisition in flight");
            return;
        }

        self.screen_acquiring = true;
        let capture = self.collaborators.capture.clone();
        let tx = self.event_tx.clone();
        self.background.spawn(async move {
            let result = capture.open_screen(&ScreenConstraints::default()).await;
            let _ = tx.send(OrchestratorEvent::ScreenAcquired { result }).await;
        });
    }

    async fn on_screen_acquired(&mut self, result: Result<CaptureStream, CaptureError>) {
        self.screen_acquiring = false;
        let replies = std::mem::take(&mut self.screen_requests);

        let fail = |replies: Vec<SwapReply>, error: OrchestratorError| {
            for reply in replies {
                let _ = reply.send(Err(error.clone()));
            }
        };

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Screen acquisition failed: {}", e);
                fail(replies, e.into());
                return;
            }
        };

        if self.screen_cancelled {
            info!("Screen share stopped while the picker was open");
            stream.stop();
            fail(replies, OrchestratorError::ShareCancelled);
            return;
        }

        let Some(video) = stream.video.clone() else {
            stream.stop();
            fail(
                replies,
                OrchestratorError::DeviceUnavailable("screen source has no video".to_owned()),
            );
            return;
        };

        let tx = self.event_tx.clone();
        self.background.spawn(async move {
            video.ended().await;
            let _ = tx
                .send(OrchestratorEvent::ScreenEnded {
                    track_id: video.id().to_owned(),
                })
                .await;
        });

        self.media.install_screen(stream);
        self.begin_swap(OutgoingKind::Screen, replies);
        self.broadcast_status(SignalMessage::ShareStatus { is_sharing: true })
            .await;
        self.emit(SessionEvent::LocalMediaChanged(self.media.status()));
    }

    async fn stop_screen_share(&mut self, reply: Option<SwapReply>) {
        if !self.media.is_sharing() {
            if self.screen_acquiring {
                self.screen_cancelled = true;
            }
            if let Some(reply) = reply {
                let _ = reply.send(Ok(SwapReport::new(OutgoingKind::Camera)));
            }
            return;
        }

        self.begin_swap(OutgoingKind::Camera, reply.into_iter().collect());
        self.media.take_screen();
        self.broadcast_status(SignalMessage::ShareStatus { is_sharing: false })
            .await;
        self.emit(SessionEvent::LocalMediaChanged(self.media.status()));
    }

    fn begin_swap(&mut self, kind: OutgoingKind, replies: Vec<SwapReply>) {
        let swap = SwapId(self.next_id());
        let targets = self
            .media
            .set_active_outgoing(kind, self.sessions.values_mut(), swap);

        if targets.is_empty() {
            PendingSwap::new(kind, targets, replies).finish();
            return;
        }

        info!("{} to {:?} started toward {} peer(s)", swap, kind, targets.len());
        self.swaps
            .insert(swap, PendingSwap::new(kind, targets, replies));
    }

    fn settle_swap(&mut self, swap: SwapId, peer_id: &PeerId, result: Result<(), String>) {
        let Some(pending) = self.swaps.get_mut(&swap) else {
            return;
        };
        pending.record(peer_id, result);
        if pending.is_settled() {
            self.finish_swap(swap);
        }
    }

    /// A closed session can no longer report; count it as failed.
    fn abandon_swaps(&mut self, peer_id: &PeerId) {
        let settled: Vec<SwapId> = self
            .swaps
            .iter_mut()
            .filter_map(|(id, pending)| {
                pending.record(peer_id, Err("session closed".to_owned()));
                pending.is_settled().then_some(*id)
            })
            .collect();

        for swap in settled {
            self.finish_swap(swap);
        }
    }

    fn finish_swap(&mut self, swap: SwapId) {
        if let Some(pending) = self.swaps.remove(&swap) {
            let report = pending.finish();
            let failed = report.failed().count();
            if failed == 0 {
                info!("{} to {:?} done", swap, report.kind);
            } else {
                warn!(
                    "{} to {:?} done, {} of {} peer(s) kept their previous source",
                    swap,
                    report.kind,
                    failed,
                    report.results.len()
                );
            }
        }
    }

    fn on_camera_acquired(
        &mut self,
        result: Result<CaptureStream, CaptureError>,
    ) -> Result<LocalMediaStatus, OrchestratorError> {
        let stream = result.map_err(|e| {
            warn!("Camera acquisition failed: {}", e);
            OrchestratorError::DeviceUnavailable(e.to_string())
        })?;

        self.media.install_camera(stream);
        for session in self.sessions.values_mut() {
            if session.state().accepts_hot_swap() {
                self.media.catch_up(session);
            }
        }

        let status = self.media.status();
        info!("Camera acquired: {:?}", status);
        self.emit(SessionEvent::LocalMediaChanged(status));
        Ok(status)
    }

    /// Closes every session and releases local media. The dispatch loop
    /// stops after the current command.
    fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        info!("Shutting down orchestrator for {}", self.local_id);

        self.background.abort_all();
        self.screen_acquiring = false;
        for reply in self.screen_requests.drain(..) {
            let _ = reply.send(Err(OrchestratorError::Closed));
        }

        let peers: Vec<PeerId> = self.sessions.keys().cloned().collect();
        for peer_id in peers {
            self.close_session(&peer_id, CloseReason::Shutdown);
        }
        for (_, pending) in self.swaps.drain() {
            pending.abort();
        }

        self.media.release();
        self.view.clear();
        self.stopped = true;
    }
}
