use crate::audio::AudioFrameReceiver;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Which side of the audio path a device sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Microphone or line-in
    Input,
    /// Speaker or headphones
    Output,
}

/// Raw device record as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    /// May be empty when the platform hides labels
    pub label: String,
    pub kind: DeviceKind,
}

/// `deviceId` constraint on a microphone request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceIdConstraint {
    /// Only this device is acceptable
    Exact(String),
}

/// Constraints for acquiring local audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceIdConstraint>,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            noise_suppression: true,
            echo_cancellation: true,
            auto_gain_control: true,
        }
    }
}

impl AudioConstraints {
    /// Constraints pinned to one input device, or the defaults when `device_id` is `None`
    pub fn for_device(device_id: Option<&str>) -> Self {
        Self {
            device_id: device_id
                .filter(|id| !id.is_empty())
                .map(|id| DeviceIdConstraint::Exact(id.to_string())),
            ..Self::default()
        }
    }

    /// The exact device requested, if any
    pub fn exact_device(&self) -> Option<&str> {
        match &self.device_id {
            Some(DeviceIdConstraint::Exact(id)) => Some(id.as_str()),
            None => None,
        }
    }
}

/// A live local media track holding hardware access until stopped
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;

    /// Track kind as a media string ("audio")
    fn kind(&self) -> &str;

    fn is_live(&self) -> bool;

    /// Release the underlying hardware. Idempotent and may block.
    fn stop(&self);

    /// Hand over the captured PCM feed. Yields `Some` at most once.
    fn take_frames(&self) -> Option<AudioFrameReceiver> {
        None
    }
}

/// Tracks returned by a single microphone request
#[derive(Clone)]
pub struct LocalStream {
    pub id: String,
    pub tracks: Vec<Arc<dyn LocalTrack>>,
}

impl LocalStream {
    /// Stop every track off the async executor
    pub async fn stop_all(&self) {
        let tracks = self.tracks.clone();
        let stopped = tokio::task::spawn_blocking(move || {
            for track in &tracks {
                track.stop();
            }
        })
        .await;

        if let Err(e) = stopped {
            warn!("Stopping local tracks failed: {}", e);
        }
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }
}

impl std::fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// Remote audio being rendered on an output device
pub trait Playback: Send + Sync {
    /// Output device in use, `None` for the platform default
    fn device_id(&self) -> Option<String>;

    fn is_playing(&self) -> bool;

    /// Release the output device. Idempotent and may block.
    fn stop(&self);
}

/// Platform media access
///
/// Implementations:
/// - `CpalMediaDevices`: native audio hosts via cpal
/// - test doubles in `tests/common`
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire microphone access
    ///
    /// Fails with `VoiceError::PermissionDenied` when access is refused.
    async fn get_user_media(&self, constraints: &AudioConstraints) -> Result<LocalStream>;

    /// List every audio device the platform exposes
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Start rendering decoded remote audio on an output device
    async fn play(
        &self,
        frames: AudioFrameReceiver,
        device_id: Option<&str>,
    ) -> Result<Arc<dyn Playback>>;

    /// Route remote playback to the given output device
    ///
    /// Moves any active playback over; later playback starts there too.
    async fn set_sink(&self, device_id: &str) -> Result<()>;
}
