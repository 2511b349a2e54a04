use crate::devices::{LocalStream, Playback};
use crate::transport::PeerTransport;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One live peer-to-peer voice session
///
/// Owns the transport, the local microphone tracks, remote playback and the
/// task consuming transport events. Dropping the session without `teardown` leaks hardware
/// access, so the controller always tears down explicitly.
pub struct Session {
    /// Correlates signaling requests with the server-side session
    id: String,

    transport: Arc<dyn PeerTransport>,

    stream: LocalStream,

    /// Remote audio being rendered, once the peer sends it
    playback: Option<Arc<dyn Playback>>,

    /// Task consuming the transport event stream
    events: Option<JoinHandle<()>>,

    started_at: Instant,
}

impl Session {
    /// Generate a session correlation id
    ///
    /// UUID v4 rendered as 32 hex chars: 122 random bits, so collisions are
    /// negligible even across many deployments sharing a signaling server.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    pub fn new(
        id: String,
        transport: Arc<dyn PeerTransport>,
        stream: LocalStream,
        events: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            transport,
            stream,
            playback: None,
            events: Some(events),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn live_tracks(&self) -> usize {
        self.stream.live_tracks()
    }

    /// Install remote playback, returning whatever it replaces
    pub fn attach_playback(&mut self, playback: Arc<dyn Playback>) -> Option<Arc<dyn Playback>> {
        self.playback.replace(playback)
    }

    /// Stop playback and every local track, then close the transport
    ///
    /// Device release blocks, so it runs on the blocking pool.
    /// `abort_events` is false when called from the event task itself.
    pub async fn teardown(mut self, abort_events: bool) {
        info!("Shutting down session {}", self.id);

        let tracks = self.stream.tracks.clone();
        let playback = self.playback.take();
        let released = tokio::task::spawn_blocking(move || {
            if let Some(playback) = playback {
                playback.stop();
            }
            for track in &tracks {
                info!("Stopping track: {}", track.kind());
                track.stop();
            }
        })
        .await;

        if let Err(e) = released {
            warn!("Releasing audio devices failed: {}", e);
        }

        if let Err(e) = self.transport.close().await {
            warn!("Failed to close transport: {}", e);
        }

        if let Some(events) = self.events.take() {
            if abort_events {
                events.abort();
            }
        }

        info!(
            "Session {} closed after {:.1}s and microphone access released",
            self.id,
            self.started_at.elapsed().as_secs_f64()
        );
    }
}
