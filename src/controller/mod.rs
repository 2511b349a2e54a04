//! Voice session lifecycle
//!
//! This module provides the `VoiceController` that manages:
//! - Microphone acquisition with the selected input device
//! - Peer transport creation and offer/answer exchange
//! - ICE candidate forwarding
//! - Connection state tracking and teardown

mod controller;
mod notify;
mod session;
mod state;

pub use controller::{ConnectionCallback, VoiceController, DATA_CHANNEL_LABEL};
pub use notify::{LogNotifier, Notifier, PERMISSION_DENIED_MESSAGE};
pub use session::Session;
pub use state::{transition, ConnectionState, Transition};
