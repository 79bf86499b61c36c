mod candidate_buffer;
mod peer_session;
mod peer_status;
mod session_driver;
mod session_state;

pub use candidate_buffer::CandidateBuffer;
pub use peer_session::PeerSession;
pub(crate) use peer_session::CandidateDisposition;
pub use peer_status::{PeerStatus, RemoteMediaStatus};
pub(crate) use session_driver::{DriverOutcome, SessionDriver, SessionOp};
pub use session_state::{CloseReason, InvalidTransition, Role, SessionState};

use std::fmt;

/// Identity of one [`PeerSession`]. A participant that leaves and joins again
/// gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

/// Identity of one connection object. Changes when a session abandons its
/// connection during glare resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}
