use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Opus runs at 48 kHz on the wire
pub const WIRE_SAMPLE_RATE: u32 = 48_000;

/// Duration of one encoded packet
pub const FRAME_DURATION_MS: u32 = 20;

/// Mono samples in one 20 ms wire frame (960 @ 48 kHz)
pub const FRAME_SAMPLES: usize = (WIRE_SAMPLE_RATE * FRAME_DURATION_MS / 1000) as usize;

/// Frames buffered between an audio thread and the async side before dropping
pub const FRAME_QUEUE_DEPTH: usize = 64;

/// Block of PCM samples (f32, interleaved)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Samples in the range -1.0 to 1.0
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

impl AudioFrame {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Average interleaved channels down to one
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }

    pub fn duration_ms(&self) -> f64 {
        let channels = self.channels.max(1) as f64;
        self.samples.len() as f64 / channels * 1000.0 / self.sample_rate as f64
    }
}

pub type AudioFrameSender = mpsc::Sender<AudioFrame>;
pub type AudioFrameReceiver = mpsc::Receiver<AudioFrame>;

pub fn frame_channel() -> (AudioFrameSender, AudioFrameReceiver) {
    mpsc::channel(FRAME_QUEUE_DEPTH)
}

/// Streaming linear-interpolation resampler for mono PCM
///
/// Keeps the last input sample and the fractional read position between
/// calls so consecutive blocks join without clicks.
#[derive(Debug, Clone)]
pub struct Resampler {
    from: u32,
    to: u32,
    step: f64,
    position: f64,
    last: f32,
}

impl Resampler {
    pub fn new(from: u32, to: u32) -> Self {
        Self {
            from,
            to,
            step: from as f64 / to as f64,
            position: 1.0,
            last: 0.0,
        }
    }

    pub fn input_rate(&self) -> u32 {
        self.from
    }

    pub fn output_rate(&self) -> u32 {
        self.to
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.from == self.to {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        // Index 0 is the previous block's final sample, 1..=n is `input`
        let last = self.last;
        let at = |i: usize| if i == 0 { last } else { input[i - 1] };
        let n = input.len() as f64;

        let mut output = Vec::with_capacity((n / self.step) as usize + 1);
        while self.position < n {
            let i = self.position.floor() as usize;
            let frac = (self.position - i as f64) as f32;
            let (a, b) = (at(i), at(i + 1));
            output.push(a + (b - a) * frac);
            self.position += self.step;
        }

        self.position -= n;
        self.last = input[input.len() - 1];
        output
    }
}

/// Bounded mono queue between the decoder and an output device
///
/// Overflow drops the oldest samples; underrun plays silence.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    samples: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl PlaybackBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, samples: &[f32]) {
        let mut queue = self.lock();
        queue.extend(samples.iter().copied());
        let excess = queue.len().saturating_sub(self.capacity);
        queue.drain(..excess);
    }

    /// Fill an interleaved output block, copying each mono sample to every channel
    ///
    /// Returns the number of frames taken from the queue.
    pub fn fill<T: Copy>(&self, out: &mut [T], channels: usize, convert: impl Fn(f32) -> T) -> usize {
        let channels = channels.max(1);
        let mut queue = self.lock();
        let mut taken = 0;

        for frame in out.chunks_mut(channels) {
            let sample = match queue.pop_front() {
                Some(sample) => {
                    taken += 1;
                    sample
                }
                None => 0.0,
            };
            let value = convert(sample);
            for slot in frame.iter_mut() {
                *slot = value;
            }
        }

        taken
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_downmix() {
        let frame = AudioFrame {
            samples: vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0],
            sample_rate: 48000,
            channels: 2,
        };
        assert_eq!(frame.to_mono(), vec![0.5, 0.5, 0.0]);
        assert!((frame.duration_ms() - 0.0625).abs() < 1e-9);
    }

    #[test]
    fn test_resample_down_by_three() {
        let mut resampler = Resampler::new(48000, 16000);
        let input: Vec<f32> = (0..FRAME_SAMPLES).map(|i| i as f32).collect();

        let output = resampler.process(&input);

        assert_eq!(output.len(), 320);
        assert_eq!(output[0], 0.0);
        assert_eq!(output[1], 3.0);
    }

    #[test]
    fn test_resample_is_continuous_across_blocks() {
        let mut resampler = Resampler::new(44100, 48000);
        let mut total = 0;
        for _ in 0..10 {
            let output = resampler.process(&vec![0.25; 4410]);
            assert!(output.iter().all(|s| (s - 0.25).abs() < 1e-6 || *s == 0.0));
            total += output.len();
        }
        assert!((total as i64 - 48000).abs() <= 1);
    }

    #[test]
    fn test_playback_buffer_drops_oldest_and_pads_silence() {
        let buffer = PlaybackBuffer::new(4);
        buffer.push(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(buffer.len(), 4);

        let mut out = [9i16; 12];
        let taken = buffer.fill(&mut out, 2, |s| (s * 10.0).round() as i16);

        assert_eq!(taken, 4);
        assert_eq!(out, [3, 3, 4, 4, 5, 5, 6, 6, 0, 0, 0, 0]);
        assert!(buffer.is_empty());
    }
}
