use crate::session::{PeerStatus, SessionState};
use dashmap::DashMap;
use meshrtc_core::PeerId;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct ViewInner {
    peers: DashMap<PeerId, PeerStatus>,
    connected: AtomicUsize,
}

/// Snapshot of every live session, readable without going through the
/// dispatch loop. Updated by the loop after each mutation.
#[derive(Clone)]
pub struct SessionView {
    inner: Arc<ViewInner>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionView {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ViewInner {
                peers: DashMap::new(),
                connected: AtomicUsize::new(0),
            }),
        }
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<PeerStatus> {
        self.inner.peers.get(peer_id).map(|status| status.clone())
    }

    pub fn state(&self, peer_id: &PeerId) -> Option<SessionState> {
        self.inner.peers.get(peer_id).map(|status| status.state)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.inner.peers.contains_key(peer_id)
    }

    /// Statuses ordered by peer id.
    pub fn peers(&self) -> Vec<PeerStatus> {
        let mut peers: Vec<PeerStatus> = self
            .inner
            .peers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        peers.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        peers
    }

    pub fn len(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.peers.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn upsert(&self, status: PeerStatus) {
        self.inner.peers.insert(status.peer_id.clone(), status);
    }

    pub(crate) fn remove(&self, peer_id: &PeerId) {
        self.inner.peers.remove(peer_id);
    }

    pub(crate) fn set_connected_count(&self, count: usize) {
        self.inner.connected.store(count, Ordering::SeqCst);
    }

    pub(crate) fn clear(&self) {
        self.inner.peers.clear();
        self.inner.connected.store(0, Ordering::SeqCst);
    }
}
