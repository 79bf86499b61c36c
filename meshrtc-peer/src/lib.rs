//! Peer session orchestration for full-mesh audio/video calls.
//!
//! An [`Orchestrator`] owns one [`PeerSession`] per remote participant and
//! drives it through offer/answer negotiation, candidate exchange,
//! connectivity monitoring and teardown. All state changes happen on a single
//! dispatch loop; transport work runs on per-session drivers and re-enters the
//! loop as events.

mod error;
mod media;
mod orchestrator;
mod session;
mod signaling;
mod transport;

pub use error::OrchestratorError;
pub use media::*;
pub use orchestrator::*;
pub use session::*;
pub use signaling::*;
pub use transport::*;
