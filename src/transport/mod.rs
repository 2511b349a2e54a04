//! Peer transport abstraction
//!
//! The connection controller never touches a peer connection directly. It
//! drives a `PeerTransport` and consumes the `TransportEvent` stream the
//! transport emits for candidate discovery, state changes and remote tracks.

mod peer;

pub use peer::{WebRtcTransport, WebRtcTransportFactory};

use crate::audio::AudioFrameReceiver;
use crate::devices::LocalTrack;
use crate::error::Result;
use crate::signaling::{IceCandidate, RelayConfig, SessionDescription};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;

/// Aggregate peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Decoded audio of one remote track, claimed once by whoever plays it
#[derive(Clone)]
pub struct RemoteAudio(Arc<StdMutex<Option<AudioFrameReceiver>>>);

impl RemoteAudio {
    pub fn new(frames: AudioFrameReceiver) -> Self {
        Self(Arc::new(StdMutex::new(Some(frames))))
    }

    pub fn take(&self) -> Option<AudioFrameReceiver> {
        self.0.lock().ok().and_then(|mut frames| frames.take())
    }
}

impl std::fmt::Debug for RemoteAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self.0.lock().map(|frames| frames.is_some()).unwrap_or(false);
        f.debug_struct("RemoteAudio").field("pending", &pending).finish()
    }
}

impl PartialEq for RemoteAudio {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Something the transport observed
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A local ICE candidate was gathered
    IceCandidate(IceCandidate),
    /// The peer connection changed state
    StateChanged(TransportState),
    /// The remote side started sending media
    ///
    /// `audio` carries the decoded feed for Opus audio tracks.
    RemoteTrack {
        kind: String,
        stream_id: String,
        audio: Option<RemoteAudio>,
    },
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// One peer-to-peer media session
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// Send a local track to the remote peer
    ///
    /// Captured audio the track hands over is encoded and streamed.
    async fn add_track(&self, track: &dyn LocalTrack, stream_id: &str) -> Result<()>;

    /// Open a data channel with the given label
    async fn open_data_channel(&self, label: &str) -> Result<()>;

    /// Create an offer and install it as the local description
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply the remote answer
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Close the connection. Events stop after this returns.
    async fn close(&self) -> Result<()>;
}

/// Builds transports for new sessions
#[async_trait::async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        relay: &RelayConfig,
        events: EventSender,
    ) -> Result<Arc<dyn PeerTransport>>;
}
