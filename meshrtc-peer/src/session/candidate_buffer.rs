use meshrtc_core::IceCandidate;
use std::collections::VecDeque;

/// Remote candidates that arrived before the remote description was applied.
///
/// Drained exactly once, in arrival order. After [`CandidateBuffer::discard`]
/// the buffer refuses further candidates.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    queue: VecDeque<IceCandidate>,
    discarded: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the buffer was already discarded.
    pub fn push(&mut self, candidate: IceCandidate) -> bool {
        if self.discarded {
            return false;
        }
        self.queue.push_back(candidate);
        true
    }

    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.queue.drain(..).collect()
    }

    pub fn discard(&mut self) {
        self.queue.clear();
        self.discarded = true;
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
