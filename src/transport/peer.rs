use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::{
    EventSender, PeerTransport, RemoteAudio, TransportEvent, TransportFactory, TransportState,
};
use crate::audio::{
    frame_channel, run_decoder, run_encoder, AudioFrameReceiver, FRAME_DURATION_MS,
    FRAME_QUEUE_DEPTH,
};
use crate::devices::LocalTrack;
use crate::error::{Result, VoiceError};
use crate::signaling::{IceCandidate, RelayConfig, SdpType, SessionDescription};

/// Creates `webrtc` peer connections with default codecs and interceptors
#[derive(Debug, Default, Clone)]
pub struct WebRtcTransportFactory;

impl WebRtcTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

fn ice_servers(relay: &RelayConfig) -> Vec<RTCIceServer> {
    relay
        .ice_servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server.urls.to_vec(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

fn transport_state(state: RTCPeerConnectionState) -> TransportState {
    match state {
        RTCPeerConnectionState::Connecting => TransportState::Connecting,
        RTCPeerConnectionState::Connected => TransportState::Connected,
        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
        RTCPeerConnectionState::Failed => TransportState::Failed,
        RTCPeerConnectionState::Closed => TransportState::Closed,
        _ => TransportState::New,
    }
}

#[async_trait::async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        relay: &RelayConfig,
        events: EventSender,
    ) -> Result<Arc<dyn PeerTransport>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: ice_servers(relay),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(config).await?);
        install_handlers(&peer_connection, events);

        info!("Peer connection created");

        Ok(Arc::new(WebRtcTransport {
            peer_connection,
            data_channel: Mutex::new(None),
        }))
    }
}

fn install_handlers(peer_connection: &Arc<RTCPeerConnection>, events: EventSender) {
    let ice_events = events.clone();
    peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let events = ice_events.clone();
        Box::pin(async move {
            let Some(candidate) = candidate else {
                return;
            };

            match candidate.to_json() {
                Ok(init) => {
                    let _ = events.send(TransportEvent::IceCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }));
                }
                Err(e) => warn!("Failed to serialize ICE candidate: {}", e),
            }
        })
    }));

    peer_connection.on_ice_connection_state_change(Box::new(
        move |state: RTCIceConnectionState| {
            info!("ICE connection state change: {}", state);
            Box::pin(async {})
        },
    ));

    let state_events = events.clone();
    peer_connection.on_peer_connection_state_change(Box::new(
        move |state: RTCPeerConnectionState| {
            info!("Connection state change: {}", state);
            let _ = state_events.send(TransportEvent::StateChanged(transport_state(state)));
            Box::pin(async {})
        },
    ));

    peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
        let events = events.clone();
        Box::pin(async move {
            let kind = track.kind().to_string();
            let mime_type = track.codec().capability.mime_type;
            info!("Track received: {} ({})", kind, mime_type);

            let (mut payloads, audio) = if mime_type.eq_ignore_ascii_case(MIME_TYPE_OPUS) {
                match start_downlink() {
                    Ok((payloads, audio)) => (Some(payloads), Some(audio)),
                    Err(e) => {
                        warn!("Remote audio will not play: {}", e);
                        (None, None)
                    }
                }
            } else {
                (None, None)
            };

            let _ = events.send(TransportEvent::RemoteTrack {
                kind,
                stream_id: track.stream_id(),
                audio,
            });

            // RTP is read even without a decoder so receive buffers never fill up
            tokio::spawn(async move {
                let mut packets: u64 = 0;
                while let Ok((packet, _)) = track.read_rtp().await {
                    packets += 1;
                    let Some(tx) = &payloads else {
                        continue;
                    };
                    match tx.try_send(packet.payload.to_vec()) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!("Decoder behind, dropping packet")
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => payloads = None,
                    }
                }
                debug!("Remote track ended after {} packets", packets);
            });
        })
    }));
}

/// Start an Opus decoder thread for one remote track
///
/// Returns the sender for RTP payloads and the decoded feed.
fn start_downlink() -> Result<(mpsc::Sender<Vec<u8>>, RemoteAudio)> {
    let (payloads_tx, payloads_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
    let (frames_tx, frames_rx) = frame_channel();

    thread::Builder::new()
        .name("opus-decode".to_string())
        .spawn(move || run_decoder(payloads_rx, frames_tx))
        .map_err(|e| VoiceError::Codec(format!("failed to spawn decoder thread: {}", e)))?;

    Ok((payloads_tx, RemoteAudio::new(frames_rx)))
}

/// Encode captured audio and write it to the outbound track
///
/// Ends when the capture feed closes or the track stops accepting samples.
fn start_uplink(frames: AudioFrameReceiver, outbound: Arc<TrackLocalStaticSample>) -> Result<()> {
    let (packets_tx, mut packets_rx) = mpsc::channel::<Vec<u8>>(FRAME_QUEUE_DEPTH);

    thread::Builder::new()
        .name("opus-encode".to_string())
        .spawn(move || run_encoder(frames, packets_tx))
        .map_err(|e| VoiceError::Codec(format!("failed to spawn encoder thread: {}", e)))?;

    tokio::spawn(async move {
        let duration = Duration::from_millis(FRAME_DURATION_MS as u64);
        let mut sent: u64 = 0;

        while let Some(packet) = packets_rx.recv().await {
            let sample = Sample {
                data: packet.into(),
                duration,
                ..Default::default()
            };
            if let Err(e) = outbound.write_sample(&sample).await {
                warn!("Outbound audio stopped: {}", e);
                break;
            }
            sent += 1;
        }

        debug!("Uplink ended after {} packets", sent);
    });

    Ok(())
}

/// `webrtc` peer connection wrapped as a `PeerTransport`
pub struct WebRtcTransport {
    peer_connection: Arc<RTCPeerConnection>,
    data_channel: Mutex<Option<Arc<RTCDataChannel>>>,
}

#[async_trait::async_trait]
impl PeerTransport for WebRtcTransport {
    async fn add_track(&self, track: &dyn LocalTrack, stream_id: &str) -> Result<()> {
        info!("Adding track: {}", track.kind());

        let outbound = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                clock_rate: 48000,
                channels: 1,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            track.id().to_string(),
            stream_id.to_string(),
        ));

        let sender = self
            .peer_connection
            .add_track(Arc::clone(&outbound) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        match track.take_frames() {
            Some(frames) => start_uplink(frames, outbound)?,
            None => warn!("Track {} has no capture feed, sending silence", track.id()),
        }

        // RTCP must be read for interceptors to run
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        Ok(())
    }

    async fn open_data_channel(&self, label: &str) -> Result<()> {
        let channel = self.peer_connection.create_data_channel(label, None).await?;

        let name = label.to_string();
        channel.on_open(Box::new(move || {
            info!("Data channel {}: open", name);
            Box::pin(async {})
        }));

        let name = label.to_string();
        channel.on_close(Box::new(move || {
            info!("Data channel {}: closed", name);
            Box::pin(async {})
        }));

        channel.on_error(Box::new(move |e: webrtc::Error| {
            error!("Data channel error: {}", e);
            Box::pin(async {})
        }));

        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            info!(
                "Data channel message received: {}",
                String::from_utf8_lossy(&msg.data)
            );
            Box::pin(async {})
        }));

        *self.data_channel.lock().await = Some(channel);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        info!("Creating offer...");
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        info!("Local description (offer) set.");

        Ok(SessionDescription {
            sdp: offer.sdp,
            sdp_type: SdpType::Offer,
        })
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let remote = match description.sdp_type {
            SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
            SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
            SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
            SdpType::Rollback => {
                return Err(VoiceError::Protocol(
                    "rollback is not a valid remote description".to_string(),
                ))
            }
        };

        self.peer_connection.set_remote_description(remote).await?;
        info!("Remote description (answer) set.");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(channel) = self.data_channel.lock().await.take() {
            if let Err(e) = channel.close().await {
                debug!("Data channel close failed: {}", e);
            }
        }

        self.peer_connection.close().await?;
        Ok(())
    }
}
