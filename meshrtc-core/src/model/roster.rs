use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};

/// Room membership changes delivered by the signaling side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RosterEvent {
    ParticipantJoined { id: PeerId },
    ParticipantLeft { id: PeerId },
    ParticipantKicked { id: PeerId },
}

impl RosterEvent {
    pub fn peer_id(&self) -> &PeerId {
        match self {
            Self::ParticipantJoined { id }
            | Self::ParticipantLeft { id }
            | Self::ParticipantKicked { id } => id,
        }
    }
}
