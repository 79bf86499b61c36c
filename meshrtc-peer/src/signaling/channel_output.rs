use crate::signaling::SignalingOutput;
use anyhow::{Context, Result};
use async_trait::async_trait;
use meshrtc_core::{PeerId, SignalMessage};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// A signaling message together with its recipient, in the wire shape
/// `{"type": ..., "targetId": ..., ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingSignal {
    pub target_id: PeerId,
    #[serde(flatten)]
    pub message: SignalMessage,
}

impl OutgoingSignal {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// [`SignalingOutput`] that hands messages to the host over a channel, for
/// hosts that own the socket in another task.
#[derive(Clone)]
pub struct ChannelSignalingOutput {
    tx: mpsc::UnboundedSender<OutgoingSignal>,
}

impl ChannelSignalingOutput {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutgoingSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SignalingOutput for ChannelSignalingOutput {
    async fn send(&self, peer_id: &PeerId, message: SignalMessage) -> Result<()> {
        debug!("Queueing {} for {}", message.kind(), peer_id);
        self.tx
            .send(OutgoingSignal {
                target_id: peer_id.clone(),
                message,
            })
            .ok()
            .context("signaling receiver dropped")
    }
}
