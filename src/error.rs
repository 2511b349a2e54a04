use thiserror::Error;

/// Errors raised while setting up or running a voice session
///
/// Every variant is terminal for the connection attempt that produced it.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Microphone access was refused by the user or the platform
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// The requested device is not present
    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    /// A signaling request failed
    #[error("signaling request failed: {0}")]
    Network(String),

    /// Relay configuration could not be obtained
    #[error("relay configuration unavailable: {0}")]
    Configuration(String),

    /// The signaling server returned something we could not use
    #[error("unexpected signaling payload: {0}")]
    Protocol(String),

    /// Audio could not be encoded or decoded
    #[error("audio codec error: {0}")]
    Codec(String),

    /// The peer connection rejected an operation
    #[error("transport error: {0}")]
    Transport(String),
}

impl VoiceError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, VoiceError::PermissionDenied(_))
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            VoiceError::Protocol(err.to_string())
        } else {
            VoiceError::Network(err.to_string())
        }
    }
}

impl From<webrtc::Error> for VoiceError {
    fn from(err: webrtc::Error) -> Self {
        VoiceError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VoiceError>;
