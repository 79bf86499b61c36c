mod media;
mod peer;
mod roster;
mod signaling;

pub use media::{OutgoingKind, TrackKind};
pub use peer::PeerId;
pub use roster::RosterEvent;
pub use signaling::{IceCandidate, IceServerConfig, SignalMessage};
