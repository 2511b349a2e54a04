// Native audio backend using cpal for device listing, capture and playback

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::media::{
    AudioConstraints, DeviceInfo, DeviceKind, LocalStream, LocalTrack, MediaDevices, Playback,
};
use super::playback::CpalPlayback;
use crate::audio::{frame_channel, AudioFrame, AudioFrameReceiver, AudioFrameSender};
use crate::error::{Result, VoiceError};

/// Media access backed by the default cpal host
///
/// cpal exposes no processing controls, so the noise suppression, echo
/// cancellation and gain flags in `AudioConstraints` are advisory here.
pub struct CpalMediaDevices {
    host: cpal::Host,
    sink: Mutex<Option<String>>,
    active: Mutex<Weak<CpalPlayback>>,
}

impl CpalMediaDevices {
    pub fn new() -> Self {
        let host = cpal::default_host();
        info!("cpal audio host: {}", host.id().name());
        Self {
            host,
            sink: Mutex::new(None),
            active: Mutex::new(Weak::new()),
        }
    }

    /// Output device currently selected for playback
    pub fn sink(&self) -> Option<String> {
        self.sink.lock().ok().and_then(|s| s.clone())
    }

    fn devices(&self, kind: DeviceKind) -> Result<Vec<(String, cpal::Device)>> {
        let devices: Vec<cpal::Device> = match kind {
            DeviceKind::Input => self
                .host
                .input_devices()
                .map_err(|e| VoiceError::DeviceNotFound(e.to_string()))?
                .collect(),
            DeviceKind::Output => self
                .host
                .output_devices()
                .map_err(|e| VoiceError::DeviceNotFound(e.to_string()))?
                .collect(),
        };

        Ok(devices
            .into_iter()
            .enumerate()
            .map(|(index, device)| {
                let name = device.name().unwrap_or_default();
                (device_id(kind, index, &name), device)
            })
            .collect())
    }

    fn input_device(&self, constraints: &AudioConstraints) -> Result<cpal::Device> {
        match constraints.exact_device() {
            Some(wanted) => self
                .devices(DeviceKind::Input)?
                .into_iter()
                .find(|(id, _)| id == wanted)
                .map(|(_, device)| device)
                .ok_or_else(|| VoiceError::DeviceNotFound(wanted.to_string())),
            None => self
                .host
                .default_input_device()
                .ok_or_else(|| VoiceError::DeviceNotFound("no default input device".to_string())),
        }
    }

    fn output_device(&self, device_id: Option<&str>) -> Result<cpal::Device> {
        match device_id {
            Some(wanted) => self
                .devices(DeviceKind::Output)?
                .into_iter()
                .find(|(id, _)| id == wanted)
                .map(|(_, device)| device)
                .ok_or_else(|| VoiceError::DeviceNotFound(wanted.to_string())),
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| VoiceError::DeviceNotFound("no default output device".to_string())),
        }
    }

    fn active_playback(&self) -> Option<Arc<CpalPlayback>> {
        self.active.lock().ok().and_then(|active| active.upgrade())
    }
}

impl Default for CpalMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

/// Synthetic device id
///
/// cpal has no stable device identifiers on every platform, so the id combines
/// the enumeration index with a hash of the device name.
fn device_id(kind: DeviceKind, index: usize, name: &str) -> String {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    let prefix = match kind {
        DeviceKind::Input => "in",
        DeviceKind::Output => "out",
    };
    format!("{}_{}_{:08x}", prefix, index, hasher.finish() & 0xFFFF_FFFF)
}

/// Map a backend failure message onto the error taxonomy
fn classify_backend_error(message: String) -> VoiceError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        VoiceError::PermissionDenied(message)
    } else {
        VoiceError::Transport(message)
    }
}

#[async_trait::async_trait]
impl MediaDevices for CpalMediaDevices {
    async fn get_user_media(&self, constraints: &AudioConstraints) -> Result<LocalStream> {
        let device = self.input_device(constraints)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        debug!(
            "Opening {} (noise_suppression={}, echo_cancellation={}, auto_gain_control={})",
            name,
            constraints.noise_suppression,
            constraints.echo_cancellation,
            constraints.auto_gain_control
        );

        let track = CpalTrack::open(device, name).await?;
        let stream_id = format!("stream-{}", uuid::Uuid::new_v4().simple());

        Ok(LocalStream {
            id: stream_id,
            tracks: vec![Arc::new(track) as Arc<dyn LocalTrack>],
        })
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut infos = Vec::new();
        for kind in [DeviceKind::Input, DeviceKind::Output] {
            for (id, device) in self.devices(kind)? {
                infos.push(DeviceInfo {
                    id,
                    label: device.name().unwrap_or_default(),
                    kind,
                });
            }
        }
        Ok(infos)
    }

    async fn play(
        &self,
        frames: AudioFrameReceiver,
        device_id: Option<&str>,
    ) -> Result<Arc<dyn Playback>> {
        let device_id = device_id.map(str::to_string).or_else(|| self.sink());
        let device = self.output_device(device_id.as_deref())?;

        let playback = CpalPlayback::start(device, device_id, frames).await?;
        if let Ok(mut active) = self.active.lock() {
            *active = Arc::downgrade(&playback);
        }
        Ok(playback)
    }

    async fn set_sink(&self, device_id: &str) -> Result<()> {
        let device = self.output_device(Some(device_id))?;

        if let Ok(mut sink) = self.sink.lock() {
            *sink = Some(device_id.to_string());
        }

        match self.active_playback() {
            Some(playback) => playback.switch_output(device, device_id.to_string()).await,
            None => Ok(()),
        }
    }
}

/// Microphone capture track
///
/// `cpal::Stream` is not `Send`, so the stream lives on a dedicated thread
/// that holds it until `stop` is called. Captured blocks are offered to a
/// bounded channel and dropped when nobody keeps up.
pub struct CpalTrack {
    id: String,
    live: Arc<AtomicBool>,
    samples: Arc<AtomicU64>,
    frames: Mutex<Option<AudioFrameReceiver>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CpalTrack {
    async fn open(device: cpal::Device, name: String) -> Result<Self> {
        let supported = device
            .default_input_config()
            .map_err(|e| classify_backend_error(e.to_string()))?;

        let live = Arc::new(AtomicBool::new(true));
        let samples = Arc::new(AtomicU64::new(0));
        let (frames_tx, frames_rx) = frame_channel();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let worker_live = Arc::clone(&live);
        let worker_samples = Arc::clone(&samples);
        let worker = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                capture_loop(device, supported, worker_live, worker_samples, frames_tx, ready_tx)
            })
            .map_err(|e| VoiceError::Transport(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                return Err(VoiceError::Transport(
                    "capture thread exited before start".to_string(),
                ))
            }
        }

        info!("Microphone access granted ({})", name);

        Ok(Self {
            id: format!("audio-{}", uuid::Uuid::new_v4().simple()),
            live,
            samples,
            frames: Mutex::new(Some(frames_rx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Samples delivered by the device since the track started
    pub fn samples_captured(&self) -> u64 {
        self.samples.load(Ordering::SeqCst)
    }
}

fn capture_loop(
    device: cpal::Device,
    supported: cpal::SupportedStreamConfig,
    live: Arc<AtomicBool>,
    samples: Arc<AtomicU64>,
    frames: AudioFrameSender,
    ready: oneshot::Sender<Result<()>>,
) {
    let config = supported.config();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let on_error = |e: cpal::StreamError| error!("Microphone stream error: {}", e);

    let deliver = move |block: Vec<f32>| {
        samples.fetch_add(block.len() as u64, Ordering::Relaxed);
        let _ = frames.try_send(AudioFrame {
            samples: block,
            sample_rate,
            channels,
        });
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| deliver(data.to_vec()),
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                deliver(data.iter().map(|&s| s as f32 / i16::MAX as f32).collect())
            },
            on_error,
            None,
        ),
        other => {
            let _ = ready.send(Err(VoiceError::Transport(format!(
                "unsupported sample format: {:?}",
                other
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(cpal::BuildStreamError::DeviceNotAvailable) => {
            let _ = ready.send(Err(VoiceError::DeviceNotFound(
                "input device not available".to_string(),
            )));
            return;
        }
        Err(e) => {
            let _ = ready.send(Err(classify_backend_error(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(classify_backend_error(e.to_string())));
        return;
    }

    if ready.send(Ok(())).is_err() {
        return;
    }

    while live.load(Ordering::SeqCst) {
        thread::park_timeout(Duration::from_millis(100));
    }

    drop(stream);
}

impl LocalTrack for CpalTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "audio"
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn take_frames(&self) -> Option<AudioFrameReceiver> {
        self.frames.lock().ok().and_then(|mut f| f.take())
    }

    fn stop(&self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }

        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            worker.thread().unpark();
            if worker.join().is_err() {
                warn!("Capture thread panicked");
            }
        }

        info!(
            "Stopped track {} after {} samples",
            self.id,
            self.samples_captured()
        );
    }
}

impl Drop for CpalTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_is_stable_for_same_name() {
        let a = device_id(DeviceKind::Input, 0, "USB Mic");
        let b = device_id(DeviceKind::Input, 0, "USB Mic");
        assert_eq!(a, b);
        assert!(a.starts_with("in_0_"));
    }

    #[test]
    fn test_device_id_differs_by_kind() {
        let input = device_id(DeviceKind::Input, 1, "Headset");
        let output = device_id(DeviceKind::Output, 1, "Headset");
        assert_ne!(input, output);
        assert!(output.starts_with("out_1_"));
    }

    #[test]
    fn test_classify_permission_errors() {
        assert!(classify_backend_error("Permission denied".to_string()).is_permission_denied());
        assert!(classify_backend_error("access not allowed".to_string()).is_permission_denied());
        assert!(!classify_backend_error("device busy".to_string()).is_permission_denied());
    }
}
