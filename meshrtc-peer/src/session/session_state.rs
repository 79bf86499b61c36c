use serde::Serialize;
use thiserror::Error;

/// Lifecycle of a [`crate::PeerSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    New,
    Offering,
    Answering,
    Connecting,
    Connected,
    /// Path lost; the grace timer decides between recovery and closure.
    Disconnected,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (New, Offering | Answering | Closed)
                | (Offering, Answering | Connecting | Closed)
                | (Answering, Connecting | Closed)
                | (Connecting, Connected | Disconnected | Closed)
                | (Connected, Disconnected | Closed)
                | (Disconnected, Connected | Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }

    /// Sessions whose outgoing video follows a source swap.
    pub fn accepts_hot_swap(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Connected)
    }

    /// The remote side has seen our description and holds a session for us.
    pub fn knows_counterpart(self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Connected | SessionState::Disconnected
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    Left,
    Kicked,
    ForceClosed,
    /// The participant joined again while the old session was disconnected.
    Replaced,
    GraceExpired,
    Failed(String),
    Shutdown,
}

impl CloseReason {
    /// Closures caused by a failure rather than by someone's decision.
    pub fn is_failure(&self) -> bool {
        matches!(self, CloseReason::GraceExpired | CloseReason::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}
