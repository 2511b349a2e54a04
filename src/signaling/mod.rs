//! HTTP signaling against the voice backend
//!
//! - GET  /webrtc/turn-credentials - relay configuration
//! - POST /webrtc/offer - offer/answer exchange and ICE candidate forwarding

pub mod client;
pub mod messages;

pub use client::{HttpSignalingClient, Signaling};
pub use messages::{
    IceCandidate, IceServer, IceUrls, RelayConfig, SdpType, SessionDescription, DEFAULT_STUN_URL,
};
