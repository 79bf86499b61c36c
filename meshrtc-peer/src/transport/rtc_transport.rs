use crate::media::{LocalTrack, RemoteMedia};
use crate::transport::{
    LinkState, PeerTransport, SdpKind, SideChannel, TransportConfig, TransportEvent,
    TransportEvents, TransportFactory,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use meshrtc_core::{IceCandidate, PeerId, TrackKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// [`TransportFactory`] backed by webrtc-rs.
pub struct RtcTransportFactory {
    config: TransportConfig,
}

impl RtcTransportFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        peer_id: PeerId,
        events: TransportEvents,
    ) -> Result<Arc<dyn PeerTransport>> {
        let transport = RtcTransport::new(peer_id, &self.config, events).await?;
        Ok(Arc::new(transport))
    }
}

pub struct RtcTransport {
    peer_id: PeerId,
    peer_connection: Arc<RTCPeerConnection>,
    senders: Mutex<HashMap<TrackKind, Arc<RTCRtpSender>>>,
    events: TransportEvents,
    side_channel_label: String,
    side_channel_created: AtomicBool,
}

impl RtcTransport {
    /// Builds the peer connection and wires its callbacks into `events`.
    pub async fn new(
        peer_id: PeerId,
        config: &TransportConfig,
        events: TransportEvents,
    ) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .context("Failed to create peer connection")?,
        );

        // Path health.
        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let events = state_events.clone();

                Box::pin(async move {
                    debug!(
                        "Peer connection state for {} changed: {:?}",
                        events.peer_id(),
                        s
                    );
                    let link = match s {
                        RTCPeerConnectionState::Connected => LinkState::Connected,
                        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
                        RTCPeerConnectionState::Failed => LinkState::Failed,
                        RTCPeerConnectionState::Closed => LinkState::Closed,
                        _ => return,
                    };
                    events.emit(TransportEvent::StateChanged(link)).await;
                })
            },
        ));

        // Trickle ICE toward the remote participant.
        let ice_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let events = ice_events.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                };
                events
                    .emit(TransportEvent::CandidateGenerated(candidate))
                    .await;
            })
        }));

        // Remote media goes to the render sink.
        let track_events = events.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = track_events.clone();

                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => TrackKind::Audio,
                        RTPCodecType::Video => TrackKind::Video,
                        _ => return,
                    };
                    info!("Remote {:?} track from {}", kind, events.peer_id());
                    let media = RemoteMedia {
                        track_id: track.id(),
                        stream_id: track.stream_id(),
                        kind,
                        track,
                    };
                    events.emit(TransportEvent::RemoteTrack(media)).await;
                })
            },
        ));

        // Side channel opened by the initiating participant.
        let dc_events = events.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let events = dc_events.clone();

            Box::pin(async move {
                debug!(
                    "Remote side channel '{}' announced by {}",
                    dc.label(),
                    events.peer_id()
                );
                wire_side_channel(dc, events);
            })
        }));

        Ok(Self {
            peer_id,
            peer_connection,
            senders: Mutex::new(HashMap::new()),
            events,
            side_channel_label: config.side_channel_label.clone(),
            side_channel_created: AtomicBool::new(false),
        })
    }

    async fn add_sender(
        &self,
        kind: TrackKind,
        track: Option<&LocalTrack>,
    ) -> Result<Arc<RTCRtpSender>> {
        let sender = match track {
            Some(track) => self
                .peer_connection
                .add_track(track.as_track_local())
                .await
                .with_context(|| format!("Failed to add {:?} track", kind))?,
            None => {
                let codec_type = match kind {
                    TrackKind::Audio => RTPCodecType::Audio,
                    TrackKind::Video => RTPCodecType::Video,
                };
                let transceiver = self
                    .peer_connection
                    .add_transceiver_from_kind(
                        codec_type,
                        Some(RTCRtpTransceiverInit {
                            direction: RTCRtpTransceiverDirection::Sendrecv,
                            send_encodings: vec![],
                        }),
                    )
                    .await
                    .with_context(|| format!("Failed to reserve {:?} sender", kind))?;
                transceiver.sender().await
            }
        };

        // RTCP has to be drained for interceptors to work.
        let rtcp_sender = sender.clone();
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtcp_sender.read(&mut rtcp_buf).await {}
        });

        Ok(sender)
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn attach_tracks(
        &self,
        audio: Option<&LocalTrack>,
        video: Option<&LocalTrack>,
    ) -> Result<()> {
        for (kind, track) in [(TrackKind::Audio, audio), (TrackKind::Video, video)] {
            let sender = self.add_sender(kind, track).await?;
            self.senders.lock().await.insert(kind, sender);
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        if !self.side_channel_created.swap(true, Ordering::SeqCst) {
            let dc = self
                .peer_connection
                .create_data_channel(&self.side_channel_label, None)
                .await
                .context("Failed to create side channel")?;
            wire_side_channel(dc, self.events.clone());
        }

        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        let desc = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(sdp)?,
        };
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .context("Failed to add ICE candidate")?;
        Ok(())
    }

    async fn replace_track(&self, kind: TrackKind, track: Option<&LocalTrack>) -> Result<()> {
        let sender = self
            .senders
            .lock()
            .await
            .get(&kind)
            .cloned()
            .with_context(|| format!("No {:?} sender toward {}", kind, self.peer_id))?;
        sender
            .replace_track(track.map(LocalTrack::as_track_local))
            .await
            .with_context(|| format!("Failed to replace {:?} track", kind))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

struct RtcSideChannel(Arc<RTCDataChannel>);

#[async_trait]
impl SideChannel for RtcSideChannel {
    fn label(&self) -> String {
        self.0.label().to_string()
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        self.0.send(&data).await?;
        Ok(())
    }
}

fn wire_side_channel(dc: Arc<RTCDataChannel>, events: TransportEvents) {
    // The channel is only usable after `open`.
    let open_events = events.clone();
    let open_dc = dc.clone();
    dc.on_open(Box::new(move || {
        let events = open_events.clone();
        let channel: Arc<dyn SideChannel> = Arc::new(RtcSideChannel(open_dc.clone()));

        Box::pin(async move {
            info!("Side channel to {} open", events.peer_id());
            events.emit(TransportEvent::SideChannelReady(channel)).await;
        })
    }));

    let msg_events = events;
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let events = msg_events.clone();

        Box::pin(async move {
            if !events
                .emit(TransportEvent::Message(Bytes::from(msg.data.to_vec())))
                .await
            {
                warn!("Dropping side channel message: orchestrator is gone");
            }
        })
    }));
}
