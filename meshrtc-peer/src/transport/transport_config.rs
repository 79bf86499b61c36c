use meshrtc_core::IceServerConfig;
use serde::Deserialize;

/// ICE configuration handed to every peer connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
    /// Label of the data channel the initiating side opens.
    pub side_channel_label: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                username: None,
                credential: None,
            }],
            side_channel_label: "meshrtc".to_owned(),
        }
    }
}
