use crate::media::LocalTrack;
use crate::orchestrator::SwapId;
use crate::session::{
    CandidateBuffer, ConnectionId, InvalidTransition, PeerStatus, RemoteMediaStatus, Role,
    SessionDriver, SessionId, SessionOp, SessionState,
};
use crate::transport::SideChannel;
use bytes::Bytes;
use meshrtc_core::{IceCandidate, PeerId, TrackKind};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::OrchestratorError;

/// Where the offer/answer exchange currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Negotiation {
    CreatingOffer,
    /// Our offer went out; exactly one answer is acceptable.
    AwaitingAnswer,
    ApplyingAnswer,
    /// Remote offer is being applied and our answer created.
    ApplyingOffer,
    Stable,
}

/// What happened to an inbound remote candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CandidateDisposition {
    Buffered,
    Applied,
    Discarded,
}

/// Per-participant state machine.
///
/// Mutated only by the orchestrator's dispatch loop. Transport work is queued
/// on the session's [`SessionDriver`]; the session never awaits it.
pub struct PeerSession {
    peer_id: PeerId,
    session_id: SessionId,
    state: SessionState,
    role: Role,
    negotiation: Negotiation,
    driver: SessionDriver,
    side_channel: Option<Arc<dyn SideChannel>>,
    candidates: CandidateBuffer,
    /// Local candidates gathered before our description was sent.
    pending_local: Vec<IceCandidate>,
    description_sent: bool,
    remote_description_set: bool,
    /// Set after dropping a stray offer; its trailing candidates are ignored
    /// until the answer we wait for shows up.
    skipping_stray_candidates: bool,
    link_up: bool,
    grace_timer: Option<(u64, JoinHandle<()>)>,
    last_activity: Instant,
    last_error: Option<String>,
    remote_media: RemoteMediaStatus,
    audio_track: Option<String>,
    video_track: Option<String>,
}

impl PeerSession {
    fn new(peer_id: PeerId, session_id: SessionId, role: Role, driver: SessionDriver) -> Self {
        Self {
            peer_id,
            session_id,
            state: SessionState::New,
            role,
            negotiation: Negotiation::Stable,
            driver,
            side_channel: None,
            candidates: CandidateBuffer::new(),
            pending_local: Vec::new(),
            description_sent: false,
            remote_description_set: false,
            skipping_stray_candidates: false,
            link_up: false,
            grace_timer: None,
            last_activity: Instant::now(),
            last_error: None,
            remote_media: RemoteMediaStatus::default(),
            audio_track: None,
            video_track: None,
        }
    }

    /// Session toward a participant that joined after us: attach local media,
    /// create the offer and wait for the answer.
    pub(crate) fn initiate(
        peer_id: PeerId,
        session_id: SessionId,
        driver: SessionDriver,
        audio: Option<LocalTrack>,
        video: Option<LocalTrack>,
    ) -> Self {
        let mut session = Self::new(peer_id, session_id, Role::Initiator, driver);
        session.attach(audio, video);
        session.driver.submit(SessionOp::CreateOffer);
        session.negotiation = Negotiation::CreatingOffer;
        session.force(SessionState::Offering);
        session
    }

    /// Session created by an offer from a participant we did not know yet.
    pub(crate) fn respond(
        peer_id: PeerId,
        session_id: SessionId,
        driver: SessionDriver,
        audio: Option<LocalTrack>,
        video: Option<LocalTrack>,
        offer: String,
    ) -> Self {
        let mut session = Self::new(peer_id, session_id, Role::Responder, driver);
        session.attach(audio, video);
        session.driver.submit(SessionOp::AcceptOffer { sdp: offer });
        session.negotiation = Negotiation::ApplyingOffer;
        session.force(SessionState::Answering);
        session
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn buffered_candidates(&self) -> usize {
        self.candidates.len()
    }

    pub(crate) fn connection(&self) -> ConnectionId {
        self.driver.connection()
    }

    pub(crate) fn link_up(&self) -> bool {
        self.link_up
    }

    pub(crate) fn set_link_up(&mut self, up: bool) {
        self.link_up = up;
    }

    pub(crate) fn attached_track(&self, kind: TrackKind) -> Option<&str> {
        match kind {
            TrackKind::Audio => self.audio_track.as_deref(),
            TrackKind::Video => self.video_track.as_deref(),
        }
    }

    pub(crate) fn remote_media_mut(&mut self) -> &mut RemoteMediaStatus {
        &mut self.remote_media
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub(crate) fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub(crate) fn transition(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        info!(
            "Session {} with {}: {:?} -> {:?}",
            self.session_id, self.peer_id, self.state, next
        );
        self.state = next;
        Ok(())
    }

    fn force(&mut self, next: SessionState) {
        if let Err(e) = self.transition(next) {
            warn!("Session {} with {}: {}", self.session_id, self.peer_id, e);
        }
    }

    fn attach(&mut self, audio: Option<LocalTrack>, video: Option<LocalTrack>) {
        self.audio_track = audio.as_ref().map(|t| t.id().to_owned());
        self.video_track = video.as_ref().map(|t| t.id().to_owned());
        self.driver.submit(SessionOp::AttachTracks { audio, video });
    }

    /// Marks our offer as delivered. Returns local candidates held back
    /// until now.
    pub(crate) fn offer_sent(&mut self) -> Vec<IceCandidate> {
        self.negotiation = Negotiation::AwaitingAnswer;
        self.description_sent = true;
        std::mem::take(&mut self.pending_local)
    }

    /// Marks our answer as delivered. Returns held-back local candidates.
    pub(crate) fn answer_sent(&mut self) -> Vec<IceCandidate> {
        self.description_sent = true;
        std::mem::take(&mut self.pending_local)
    }

    /// Answer guard: only an initiator awaiting exactly one answer takes it.
    pub(crate) fn accept_answer(&mut self, sdp: String) -> Result<(), String> {
        if self.role != Role::Initiator {
            return Err("answer received by the answering side".to_owned());
        }
        if self.state != SessionState::Offering {
            return Err(format!("answer received while {:?}", self.state));
        }
        if self.negotiation != Negotiation::AwaitingAnswer {
            return Err(format!("answer received while {:?}", self.negotiation));
        }

        self.negotiation = Negotiation::ApplyingAnswer;
        self.skipping_stray_candidates = false;
        self.driver.submit(SessionOp::AcceptAnswer { sdp });
        Ok(())
    }

    /// Glare, losing side: give up our connection and answer the remote
    /// offer on a fresh one. Buffered remote candidates belong to that offer
    /// and are kept.
    pub(crate) fn yield_to_offer(
        &mut self,
        driver: SessionDriver,
        audio: Option<LocalTrack>,
        video: Option<LocalTrack>,
        offer: String,
    ) {
        info!(
            "Session {} with {}: abandoning {} to answer remote offer",
            self.session_id,
            self.peer_id,
            self.driver.connection()
        );
        self.driver.shutdown();
        self.driver = driver;
        self.role = Role::Responder;
        self.description_sent = false;
        self.pending_local.clear();
        self.side_channel = None;
        self.link_up = false;
        self.attach(audio, video);
        self.driver.submit(SessionOp::AcceptOffer { sdp: offer });
        self.negotiation = Negotiation::ApplyingOffer;
        self.force(SessionState::Answering);
    }

    /// Glare, winning side: the remote offer is dropped.
    pub(crate) fn drop_stray_offer(&mut self) {
        self.skipping_stray_candidates = true;
    }

    /// Remote description is in place: flush buffered candidates in order.
    pub(crate) fn enter_connecting(&mut self) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Connecting)?;
        self.negotiation = Negotiation::Stable;
        self.remote_description_set = true;

        let buffered = self.candidates.drain();
        if !buffered.is_empty() {
            debug!(
                "Draining {} buffered candidates for {}",
                buffered.len(),
                self.peer_id
            );
            self.driver.submit(SessionOp::ApplyCandidates(buffered));
        }
        Ok(())
    }

    pub(crate) fn push_remote_candidate(&mut self, candidate: IceCandidate) -> CandidateDisposition {
        if self.skipping_stray_candidates {
            return CandidateDisposition::Discarded;
        }
        if self.remote_description_set {
            self.driver
                .submit(SessionOp::ApplyCandidates(vec![candidate]));
            return CandidateDisposition::Applied;
        }
        if self.candidates.push(candidate) {
            CandidateDisposition::Buffered
        } else {
            CandidateDisposition::Discarded
        }
    }

    /// Returns the candidate when it can be sent right away.
    pub(crate) fn queue_local_candidate(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.description_sent {
            return Some(candidate);
        }
        self.pending_local.push(candidate);
        None
    }

    pub(crate) fn replace_track(
        &mut self,
        kind: TrackKind,
        track: Option<LocalTrack>,
        swap: Option<SwapId>,
    ) {
        self.driver
            .submit(SessionOp::ReplaceTrack { kind, track, swap });
    }

    /// Records the track a successful replacement left on the sender.
    pub(crate) fn track_replaced(&mut self, kind: TrackKind, track_id: Option<String>) {
        match kind {
            TrackKind::Audio => self.audio_track = track_id,
            TrackKind::Video => self.video_track = track_id,
        }
    }

    pub(crate) fn set_side_channel(&mut self, channel: Arc<dyn SideChannel>) {
        self.side_channel = Some(channel);
    }

    pub(crate) fn send_data(
        &self,
        data: Bytes,
        reply: oneshot::Sender<Result<(), OrchestratorError>>,
    ) {
        match &self.side_channel {
            Some(channel) => self.driver.submit(SessionOp::SendData {
                channel: channel.clone(),
                data,
                reply,
            }),
            None => {
                let _ = reply.send(Err(OrchestratorError::SideChannelUnavailable(
                    self.peer_id.clone(),
                )));
            }
        }
    }

    pub(crate) fn start_grace(&mut self, timer_id: u64, handle: JoinHandle<()>) {
        self.cancel_grace();
        self.grace_timer = Some((timer_id, handle));
    }

    pub(crate) fn cancel_grace(&mut self) {
        if let Some((_, handle)) = self.grace_timer.take() {
            handle.abort();
        }
    }

    pub(crate) fn grace_timer_is(&self, timer_id: u64) -> bool {
        matches!(self.grace_timer, Some((id, _)) if id == timer_id)
    }

    /// Terminal step. Cancels the grace timer, discards buffered candidates,
    /// and stops the driver, which closes the connection.
    pub(crate) fn close(mut self) -> PeerStatus {
        self.cancel_grace();
        self.candidates.discard();
        self.pending_local.clear();
        self.side_channel = None;
        self.driver.shutdown();
        self.force(SessionState::Closed);
        self.status()
    }

    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            peer_id: self.peer_id.clone(),
            session_id: self.session_id,
            state: self.state,
            role: self.role,
            last_error: self.last_error.clone(),
            last_activity: self.last_activity,
            remote_media: self.remote_media,
        }
    }
}
