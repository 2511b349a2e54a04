use crate::transport::{TransportEvent, TransportState};
use serde::{Deserialize, Serialize};

/// Lifecycle of the voice session as seen by the widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session; no transport and no microphone held
    #[default]
    Idle,
    /// Session being negotiated
    Connecting,
    /// Transport reported `connected`
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    pub fn is_connecting(self) -> bool {
        self == ConnectionState::Connecting
    }

    pub fn is_idle(self) -> bool {
        self == ConnectionState::Idle
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// What the controller should do in response to a transport event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changes
    Stay,
    /// Enter `Connected`
    Connected,
    /// Release the session and return to `Idle`
    TearDown,
}

/// State transition for one transport event
///
/// Candidate and remote-track events never change state; the controller
/// handles them as side effects.
pub fn transition(state: ConnectionState, event: &TransportEvent) -> Transition {
    let TransportEvent::StateChanged(transport) = event else {
        return Transition::Stay;
    };

    match (state, *transport) {
        (ConnectionState::Connecting, TransportState::Connected) => Transition::Connected,
        (ConnectionState::Idle, _) => Transition::Stay,
        (
            _,
            TransportState::Failed | TransportState::Disconnected | TransportState::Closed,
        ) => Transition::TearDown,
        _ => Transition::Stay,
    }
}
