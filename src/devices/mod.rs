pub mod enumerator;
pub mod media;
pub mod native;
pub mod playback;

pub use enumerator::{list_devices, AudioDevice, DeviceList, DeviceSelection};
pub use media::{
    AudioConstraints, DeviceIdConstraint, DeviceInfo, DeviceKind, LocalStream, LocalTrack,
    MediaDevices, Playback,
};
pub use native::{CpalMediaDevices, CpalTrack};
pub use playback::CpalPlayback;
