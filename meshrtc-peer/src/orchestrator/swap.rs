use crate::error::OrchestratorError;
use meshrtc_core::{OutgoingKind, PeerId};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tokio::sync::oneshot;

/// Tags the track replacements belonging to one source swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapId(pub(crate) u64);

impl fmt::Display for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "swap-{}", self.0)
    }
}

/// Per-peer outcome of switching the outgoing video source.
///
/// A failed peer keeps sending its previous source; the others are switched
/// regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapReport {
    pub kind: OutgoingKind,
    pub results: BTreeMap<PeerId, Result<(), String>>,
}

impl SwapReport {
    pub fn new(kind: OutgoingKind) -> Self {
        Self {
            kind,
            results: BTreeMap::new(),
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &PeerId> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(peer_id, _)| peer_id)
    }

    pub fn failed(&self) -> impl Iterator<Item = (&PeerId, &str)> {
        self.results
            .iter()
            .filter_map(|(peer_id, r)| r.as_ref().err().map(|e| (peer_id, e.as_str())))
    }

    pub fn is_success(&self) -> bool {
        self.results.values().all(Result::is_ok)
    }
}

pub(crate) type SwapReply = oneshot::Sender<Result<SwapReport, OrchestratorError>>;

/// A swap whose replacements are still running on the session drivers.
pub(crate) struct PendingSwap {
    report: SwapReport,
    waiting: HashSet<PeerId>,
    replies: Vec<SwapReply>,
}

impl PendingSwap {
    pub(crate) fn new(kind: OutgoingKind, targets: Vec<PeerId>, replies: Vec<SwapReply>) -> Self {
        Self {
            report: SwapReport::new(kind),
            waiting: targets.into_iter().collect(),
            replies,
        }
    }

    /// Records one peer's result. Ignored for peers outside the swap.
    pub(crate) fn record(&mut self, peer_id: &PeerId, result: Result<(), String>) {
        if self.waiting.remove(peer_id) {
            self.report.results.insert(peer_id.clone(), result);
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.waiting.is_empty()
    }

    pub(crate) fn finish(self) -> SwapReport {
        for reply in self.replies {
            let _ = reply.send(Ok(self.report.clone()));
        }
        self.report
    }

    pub(crate) fn abort(self) {
        for reply in self.replies {
            let _ = reply.send(Err(OrchestratorError::Closed));
        }
    }
}
