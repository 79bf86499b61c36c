use anyhow::Result;
use async_trait::async_trait;
use meshrtc_core::{PeerId, SignalMessage};

/// Outbound half of the signaling transport.
///
/// The transport is responsible for addressing: `peer_id` travels alongside
/// the message as its target.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn send(&self, peer_id: &PeerId, message: SignalMessage) -> Result<()>;
}
