// Speaker output for decoded remote audio

use cpal::traits::{DeviceTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::media::Playback;
use crate::audio::{AudioFrameReceiver, PlaybackBuffer, Resampler, WIRE_SAMPLE_RATE};
use crate::error::{Result, VoiceError};

/// How much decoded audio may queue ahead of the device
const PLAYBACK_BUFFER_MS: usize = 500;

/// Remote audio rendered through a cpal output stream
///
/// Decoded frames are resampled to the device rate by an async feeder and
/// queued in a `PlaybackBuffer` that the output callback drains. Switching
/// devices swaps the output thread and keeps the queue.
pub struct CpalPlayback {
    device_id: Mutex<Option<String>>,
    buffer: PlaybackBuffer,
    output_rate: Arc<AtomicU32>,
    playing: AtomicBool,
    output: Mutex<Option<OutputWorker>>,
    feeder: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl CpalPlayback {
    pub(crate) async fn start(
        device: cpal::Device,
        device_id: Option<String>,
        frames: AudioFrameReceiver,
    ) -> Result<Arc<Self>> {
        let buffer = PlaybackBuffer::new(WIRE_SAMPLE_RATE as usize * PLAYBACK_BUFFER_MS / 1000);
        let (worker, rate) = OutputWorker::open(device, buffer.clone()).await?;

        let output_rate = Arc::new(AtomicU32::new(rate));
        let feeder = tokio::spawn(feed(frames, buffer.clone(), Arc::clone(&output_rate)));

        info!(
            "Playing remote audio on {} at {} Hz",
            device_id.as_deref().unwrap_or("default output"),
            rate
        );

        Ok(Arc::new(Self {
            device_id: Mutex::new(device_id),
            buffer,
            output_rate,
            playing: AtomicBool::new(true),
            output: Mutex::new(Some(worker)),
            feeder: Mutex::new(Some(feeder)),
        }))
    }

    /// Move playback to another output device
    pub(crate) async fn switch_output(&self, device: cpal::Device, device_id: String) -> Result<()> {
        if !self.is_playing() {
            return Ok(());
        }

        let (worker, rate) = OutputWorker::open(device, self.buffer.clone()).await?;
        self.output_rate.store(rate, Ordering::SeqCst);

        let previous = self.output.lock().ok().and_then(|mut o| o.replace(worker));
        if let Ok(mut current) = self.device_id.lock() {
            *current = Some(device_id.clone());
        }

        // Stopped while the new device was opening
        let orphaned = if self.is_playing() {
            None
        } else {
            self.output.lock().ok().and_then(|mut o| o.take())
        };

        let retired: Vec<OutputWorker> = previous.into_iter().chain(orphaned).collect();
        if !retired.is_empty() {
            let stopped = tokio::task::spawn_blocking(move || {
                for worker in retired {
                    worker.stop();
                }
            })
            .await;
            if let Err(e) = stopped {
                warn!("Releasing previous output failed: {}", e);
            }
        }

        info!("Playback moved to {} at {} Hz", device_id, rate);
        Ok(())
    }
}

impl Playback for CpalPlayback {
    fn device_id(&self) -> Option<String> {
        self.device_id.lock().ok().and_then(|id| id.clone())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if !self.playing.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(feeder) = self.feeder.lock().ok().and_then(|mut f| f.take()) {
            feeder.abort();
        }
        if let Some(worker) = self.output.lock().ok().and_then(|mut o| o.take()) {
            worker.stop();
        }
        self.buffer.clear();

        info!("Stopped remote audio playback");
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Move decoded frames into the playback queue at the device rate
async fn feed(mut frames: AudioFrameReceiver, buffer: PlaybackBuffer, output_rate: Arc<AtomicU32>) {
    let mut resampler: Option<Resampler> = None;

    while let Some(frame) = frames.recv().await {
        let target = output_rate.load(Ordering::SeqCst);
        let stale = resampler
            .as_ref()
            .map_or(true, |r| r.input_rate() != frame.sample_rate || r.output_rate() != target);
        if stale {
            resampler = Some(Resampler::new(frame.sample_rate, target));
        }

        if let Some(resampler) = resampler.as_mut() {
            buffer.push(&resampler.process(&frame.to_mono()));
        }
    }

    debug!("Remote audio feed ended");
}

/// Thread owning one `cpal::Stream`, which is not `Send`
struct OutputWorker {
    live: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl OutputWorker {
    /// Start the stream and report the device sample rate
    async fn open(device: cpal::Device, buffer: PlaybackBuffer) -> Result<(Self, u32)> {
        let live = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<u32>>();

        let worker_live = Arc::clone(&live);
        let thread = thread::Builder::new()
            .name("speaker-output".to_string())
            .spawn(move || output_loop(device, buffer, worker_live, ready_tx))
            .map_err(|e| VoiceError::Transport(format!("failed to spawn output thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(rate)) => Ok((Self { live, thread }, rate)),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(VoiceError::Transport(
                "output thread exited before start".to_string(),
            )),
        }
    }

    fn stop(self) {
        self.live.store(false, Ordering::SeqCst);
        self.thread.thread().unpark();
        if self.thread.join().is_err() {
            warn!("Output thread panicked");
        }
    }
}

fn output_loop(
    device: cpal::Device,
    buffer: PlaybackBuffer,
    live: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<u32>>,
) {
    let supported = match device.default_output_config() {
        Ok(supported) => supported,
        Err(e) => {
            let _ = ready.send(Err(VoiceError::DeviceNotFound(e.to_string())));
            return;
        }
    };

    let config = supported.config();
    let channels = config.channels as usize;
    let rate = config.sample_rate.0;
    let on_error = |e: cpal::StreamError| error!("Speaker stream error: {}", e);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                buffer.fill(data, channels, |s| s);
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                buffer.fill(data, channels, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
            },
            on_error,
            None,
        ),
        other => {
            let _ = ready.send(Err(VoiceError::Transport(format!(
                "unsupported output sample format: {:?}",
                other
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(VoiceError::Transport(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(VoiceError::Transport(e.to_string())));
        return;
    }

    if ready.send(Ok(rate)).is_err() {
        return;
    }

    while live.load(Ordering::SeqCst) {
        thread::park_timeout(Duration::from_millis(100));
    }

    drop(stream);
}
