//! Wire model shared by every participant of a meshrtc call: participant
//! identifiers, signaling messages, roster events and media kinds.

mod error;
pub mod model;

pub use error::ProtocolError;
pub use model::*;
