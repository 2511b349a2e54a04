use super::media::{AudioConstraints, DeviceInfo, DeviceKind, MediaDevices};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Audio device as shown in the device menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Opaque platform identifier
    pub id: String,
    /// Human-readable label
    pub label: String,
}

/// Devices partitioned by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    pub inputs: Vec<AudioDevice>,
    pub outputs: Vec<AudioDevice>,
}

impl DeviceList {
    /// Split raw platform records into inputs and outputs, preserving order
    pub fn partition(devices: Vec<DeviceInfo>) -> Self {
        let mut list = DeviceList::default();

        for device in devices {
            let label = if device.label.is_empty() {
                fallback_label(device.kind, &device.id)
            } else {
                device.label
            };

            let entry = AudioDevice { id: device.id, label };
            match device.kind {
                DeviceKind::Input => list.inputs.push(entry),
                DeviceKind::Output => list.outputs.push(entry),
            }
        }

        list
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    pub fn find(&self, kind: DeviceKind, id: &str) -> Option<&AudioDevice> {
        let devices = match kind {
            DeviceKind::Input => &self.inputs,
            DeviceKind::Output => &self.outputs,
        };
        devices.iter().find(|d| d.id == id)
    }
}

/// Devices chosen by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelection {
    pub input: Option<String>,
    pub output: Option<String>,
}

impl DeviceSelection {
    /// Fill empty slots with the first device of each kind
    pub fn apply_defaults(&mut self, devices: &DeviceList) {
        if self.input.is_none() {
            self.input = devices.inputs.first().map(|d| d.id.clone());
        }
        if self.output.is_none() {
            self.output = devices.outputs.first().map(|d| d.id.clone());
        }
    }
}

fn fallback_label(kind: DeviceKind, id: &str) -> String {
    let prefix: String = id.chars().take(5).collect();
    match kind {
        DeviceKind::Input => format!("Microphone {}", prefix),
        DeviceKind::Output => format!("Speaker {}", prefix),
    }
}

/// Query the platform for audio devices
///
/// Microphone permission is requested first since labels stay hidden until it
/// is granted; the probe stream is released immediately. Any failure is
/// logged and yields empty lists.
pub async fn list_devices(media: &dyn MediaDevices) -> DeviceList {
    match media.get_user_media(&AudioConstraints::default()).await {
        Ok(probe) => probe.stop_all().await,
        Err(e) => {
            error!("Error enumerating devices: {}", e);
            return DeviceList::default();
        }
    }

    match media.enumerate_devices().await {
        Ok(devices) => {
            let list = DeviceList::partition(devices);
            info!(
                "Found {} input and {} output devices",
                list.inputs.len(),
                list.outputs.len()
            );
            list
        }
        Err(e) => {
            error!("Error enumerating devices: {}", e);
            DeviceList::default()
        }
    }
}
