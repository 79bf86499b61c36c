use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use meshrtc_core::{IceCandidate, PeerId, TrackKind};
use meshrtc_peer::{
    ConnectionId, LinkState, LocalTrack, PeerTransport, SdpKind, SideChannel, TransportEvent,
    TransportEvents, TransportFactory,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Everything a mock connection was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOp {
    Attach {
        audio: Option<String>,
        video: Option<String>,
    },
    CreateOffer,
    CreateAnswer,
    RemoteDescription(SdpKind),
    Candidate(String),
    Replace {
        kind: TrackKind,
        track: Option<String>,
    },
    SendData(Bytes),
    Close,
    /// A call the real engine would have rejected.
    Violation(String),
}

#[derive(Debug, Clone)]
pub struct OpRecord {
    pub peer_id: PeerId,
    pub connection: ConnectionId,
    pub op: TransportOp,
}

#[derive(Default)]
struct Behavior {
    candidates: usize,
    manual_connect: bool,
    fail_replace: HashSet<PeerId>,
    fail_create: HashSet<PeerId>,
}

struct FactoryInner {
    owner: String,
    behavior: Mutex<Behavior>,
    ops: Mutex<Vec<OpRecord>>,
    events: Mutex<HashMap<PeerId, Vec<TransportEvents>>>,
}

impl FactoryInner {
    fn record(&self, peer_id: &PeerId, connection: ConnectionId, op: TransportOp) {
        self.ops.lock().unwrap().push(OpRecord {
            peer_id: peer_id.clone(),
            connection,
            op,
        });
    }
}

/// Transport factory whose connections negotiate instantly.
///
/// Each connection gathers `candidates` local candidates while creating its
/// description and reports `Connected` (plus an open side channel) once both
/// descriptions are in place and a remote candidate was added.
#[derive(Clone)]
pub struct MockTransportFactory {
    inner: Arc<FactoryInner>,
}

impl MockTransportFactory {
    pub fn new(owner: &str) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                owner: owner.to_owned(),
                behavior: Mutex::new(Behavior {
                    candidates: 2,
                    ..Default::default()
                }),
                ops: Mutex::new(Vec::new()),
                events: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Connections never report path health on their own.
    pub fn manual_connect(self) -> Self {
        self.inner.behavior.lock().unwrap().manual_connect = true;
        self
    }

    pub fn fail_replace_for(self, peer_id: &str) -> Self {
        self.inner
            .behavior
            .lock()
            .unwrap()
            .fail_replace
            .insert(PeerId::from(peer_id));
        self
    }

    pub fn fail_create_for(self, peer_id: &str) -> Self {
        self.inner
            .behavior
            .lock()
            .unwrap()
            .fail_create
            .insert(PeerId::from(peer_id));
        self
    }

    pub fn records(&self) -> Vec<OpRecord> {
        self.inner.ops.lock().unwrap().clone()
    }

    pub fn ops_for(&self, peer_id: &str) -> Vec<TransportOp> {
        let peer_id = PeerId::from(peer_id);
        self.records()
            .into_iter()
            .filter(|r| r.peer_id == peer_id)
            .map(|r| r.op)
            .collect()
    }

    pub fn count(&self, peer_id: &str, matches: impl Fn(&TransportOp) -> bool) -> usize {
        self.ops_for(peer_id).iter().filter(|op| matches(op)).count()
    }

    pub fn violations(&self) -> Vec<OpRecord> {
        self.records()
            .into_iter()
            .filter(|r| matches!(r.op, TransportOp::Violation(_)))
            .collect()
    }

    /// Connections created toward `peer_id` so far.
    pub fn connections_for(&self, peer_id: &str) -> usize {
        self.inner
            .events
            .lock()
            .unwrap()
            .get(&PeerId::from(peer_id))
            .map_or(0, Vec::len)
    }

    /// Emits on the latest connection toward `peer_id`.
    pub async fn emit(&self, peer_id: &str, event: TransportEvent) -> bool {
        let count = self.connections_for(peer_id);
        assert!(count > 0, "no connection toward {peer_id}");
        self.emit_on(peer_id, count - 1, event).await
    }

    /// Emits on the `index`-th connection ever created toward `peer_id`.
    pub async fn emit_on(&self, peer_id: &str, index: usize, event: TransportEvent) -> bool {
        let events = self.inner.events.lock().unwrap()[&PeerId::from(peer_id)][index].clone();
        events.emit(event).await
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        peer_id: PeerId,
        events: TransportEvents,
    ) -> Result<Arc<dyn PeerTransport>> {
        let (candidates, manual_connect, fail_replace, fail_create) = {
            let behavior = self.inner.behavior.lock().unwrap();
            (
                behavior.candidates,
                behavior.manual_connect,
                behavior.fail_replace.contains(&peer_id),
                behavior.fail_create.contains(&peer_id),
            )
        };
        if fail_create {
            bail!("mock refused a connection to {}", peer_id);
        }

        tracing::debug!(
            "[MockTransport] {} opens {} toward {}",
            self.inner.owner,
            events.connection(),
            peer_id
        );
        self.inner
            .events
            .lock()
            .unwrap()
            .entry(peer_id.clone())
            .or_default()
            .push(events.clone());

        Ok(Arc::new(MockTransport {
            peer_id,
            connection: events.connection(),
            events,
            factory: self.inner.clone(),
            candidates,
            manual_connect,
            fail_replace,
            local_description: AtomicBool::new(false),
            remote_description: AtomicBool::new(false),
            remote_candidates: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
        }))
    }
}

struct MockTransport {
    peer_id: PeerId,
    connection: ConnectionId,
    events: TransportEvents,
    factory: Arc<FactoryInner>,
    candidates: usize,
    manual_connect: bool,
    fail_replace: bool,
    local_description: AtomicBool,
    remote_description: AtomicBool,
    remote_candidates: AtomicUsize,
    connected: AtomicBool,
}

impl MockTransport {
    fn record(&self, op: TransportOp) {
        self.factory.record(&self.peer_id, self.connection, op);
    }

    fn violation(&self, what: &str) -> anyhow::Error {
        self.record(TransportOp::Violation(what.to_owned()));
        anyhow!("{}", what)
    }

    async fn gather(&self) {
        for i in 0..self.candidates {
            let candidate = IceCandidate {
                candidate: format!("{}/{}/{}", self.factory.owner, self.connection, i),
                sdp_mid: Some("0".to_owned()),
                sdp_m_line_index: Some(0),
            };
            self.events
                .emit(TransportEvent::CandidateGenerated(candidate))
                .await;
        }
    }

    async fn maybe_connect(&self) {
        let ready = self.local_description.load(Ordering::SeqCst)
            && self.remote_description.load(Ordering::SeqCst)
            && (self.candidates == 0 || self.remote_candidates.load(Ordering::SeqCst) > 0);
        if self.manual_connect || !ready || self.connected.swap(true, Ordering::SeqCst) {
            return;
        }

        self.events
            .emit(TransportEvent::StateChanged(LinkState::Connected))
            .await;
        let channel: Arc<dyn SideChannel> = Arc::new(MockSideChannel {
            peer_id: self.peer_id.clone(),
            connection: self.connection,
            factory: self.factory.clone(),
        });
        self.events
            .emit(TransportEvent::SideChannelReady(channel))
            .await;
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn attach_tracks(
        &self,
        audio: Option<&LocalTrack>,
        video: Option<&LocalTrack>,
    ) -> Result<()> {
        self.record(TransportOp::Attach {
            audio: audio.map(|t| t.id().to_owned()),
            video: video.map(|t| t.id().to_owned()),
        });
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        self.record(TransportOp::CreateOffer);
        self.local_description.store(true, Ordering::SeqCst);
        self.gather().await;
        Ok(format!("offer-{}-{}", self.factory.owner, self.connection))
    }

    async fn create_answer(&self) -> Result<String> {
        if !self.remote_description.load(Ordering::SeqCst) {
            return Err(self.violation("answer created before remote offer"));
        }
        self.record(TransportOp::CreateAnswer);
        self.local_description.store(true, Ordering::SeqCst);
        self.gather().await;
        self.maybe_connect().await;
        Ok(format!("answer-{}-{}", self.factory.owner, self.connection))
    }

    async fn set_remote_description(&self, kind: SdpKind, _sdp: String) -> Result<()> {
        if self.remote_description.swap(true, Ordering::SeqCst) {
            return Err(self.violation("remote description applied twice"));
        }
        self.record(TransportOp::RemoteDescription(kind));
        self.maybe_connect().await;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if !self.remote_description.load(Ordering::SeqCst) {
            return Err(self.violation("candidate before remote description"));
        }
        self.record(TransportOp::Candidate(candidate.candidate));
        self.remote_candidates.fetch_add(1, Ordering::SeqCst);
        self.maybe_connect().await;
        Ok(())
    }

    async fn replace_track(&self, kind: TrackKind, track: Option<&LocalTrack>) -> Result<()> {
        if self.fail_replace {
            bail!("sender toward {} rejected the track", self.peer_id);
        }
        self.record(TransportOp::Replace {
            kind,
            track: track.map(|t| t.id().to_owned()),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(TransportOp::Close);
        Ok(())
    }
}

struct MockSideChannel {
    peer_id: PeerId,
    connection: ConnectionId,
    factory: Arc<FactoryInner>,
}

#[async_trait]
impl SideChannel for MockSideChannel {
    fn label(&self) -> String {
        "mock".to_owned()
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        self.factory
            .record(&self.peer_id, self.connection, TransportOp::SendData(data));
        Ok(())
    }
}
