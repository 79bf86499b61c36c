use thiserror::Error;

/// A signaling message that could not be turned into a [`crate::SignalMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown signaling message kind `{0}`")]
    UnknownKind(String),

    #[error("malformed `{kind}` payload: {reason}")]
    Malformed { kind: String, reason: String },
}
