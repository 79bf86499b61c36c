use crate::error::ProtocolError;
use crate::model::media::OutgoingKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// A trickled network candidate in the browser `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// Messages exchanged between two participants over the signaling transport.
///
/// The target participant is not part of the body: the signaling transport
/// addresses every message on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SignalMessage {
    Offer { sdp: String, media_kind: OutgoingKind },
    Answer { sdp: String, media_kind: OutgoingKind },
    Candidate { candidate: IceCandidate },
    VideoStatus { has_video: bool },
    AudioStatus { has_audio: bool },
    ShareStatus { is_sharing: bool },
}

impl SignalMessage {
    pub const KINDS: [&'static str; 6] = [
        "offer",
        "answer",
        "candidate",
        "video-status",
        "audio-status",
        "share-status",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
            Self::VideoStatus { .. } => "video-status",
            Self::AudioStatus { .. } => "audio-status",
            Self::ShareStatus { .. } => "share-status",
        }
    }

    /// Builds a message from the `(kind, payload)` pair a signaling transport
    /// delivers.
    pub fn decode(kind: &str, payload: &Value) -> Result<Self, ProtocolError> {
        if !Self::KINDS.contains(&kind) {
            return Err(ProtocolError::UnknownKind(kind.to_owned()));
        }

        let malformed = |reason: String| ProtocolError::Malformed {
            kind: kind.to_owned(),
            reason,
        };

        let Value::Object(fields) = payload else {
            return Err(malformed("payload is not a JSON object".to_owned()));
        };

        let mut tagged = fields.clone();
        tagged.insert("type".to_owned(), Value::String(kind.to_owned()));

        let msg: Self =
            serde_json::from_value(Value::Object(tagged)).map_err(|e| malformed(e.to_string()))?;

        match &msg {
            Self::Offer { sdp, .. } | Self::Answer { sdp, .. } if sdp.trim().is_empty() => {
                Err(malformed("empty sdp".to_owned()))
            }
            _ => Ok(msg),
        }
    }

    /// The body of the message without its `type` tag.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(fields) = &mut value {
            fields.remove("type");
        }
        Ok(value)
    }
}
