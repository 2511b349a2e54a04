pub mod audio;
pub mod config;
pub mod controller;
pub mod devices;
pub mod error;
pub mod signaling;
pub mod transport;
pub mod widget;

pub use config::Config;
pub use controller::{ConnectionState, LogNotifier, Notifier, VoiceController};
pub use devices::{AudioDevice, CpalMediaDevices, DeviceKind, DeviceList, MediaDevices};
pub use error::{Result, VoiceError};
pub use signaling::{HttpSignalingClient, RelayConfig, SessionDescription, Signaling};
pub use transport::{PeerTransport, TransportEvent, TransportFactory, WebRtcTransportFactory};
pub use widget::{MenuPosition, VoiceWidget, WidgetOptions, WidgetView};
