use crate::audio::frame::{
    AudioFrame, AudioFrameReceiver, AudioFrameSender, Resampler, FRAME_SAMPLES, WIRE_SAMPLE_RATE,
};
use crate::error::{Result, VoiceError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Upper bound on one encoded Opus packet
const MAX_PACKET_SIZE: usize = 4000;

/// 120 ms at 48 kHz, the longest frame Opus will hand back
const MAX_FRAME_SIZE: usize = 5760;

/// Target bitrate for speech
pub const VOICE_BITRATE: i32 = 32_000;

/// Mono Opus encoder tuned for voice
pub struct OpusEncoder {
    encoder: opus::Encoder,
}

impl OpusEncoder {
    pub fn new() -> Result<Self> {
        let mut encoder = opus::Encoder::new(WIRE_SAMPLE_RATE, opus::Channels::Mono, opus::Application::Voip)
            .map_err(|e| VoiceError::Codec(format!("failed to create Opus encoder: {}", e)))?;

        encoder
            .set_bitrate(opus::Bitrate::Bits(VOICE_BITRATE))
            .map_err(|e| VoiceError::Codec(format!("failed to set Opus bitrate: {}", e)))?;

        Ok(Self { encoder })
    }

    /// Encode exactly one 20 ms frame of 48 kHz mono samples
    pub fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>> {
        let mut output = vec![0u8; MAX_PACKET_SIZE];
        let len = self
            .encoder
            .encode_float(samples, &mut output)
            .map_err(|e| VoiceError::Codec(format!("Opus encode failed: {}", e)))?;

        output.truncate(len);
        Ok(output)
    }
}

pub struct OpusDecoder {
    decoder: opus::Decoder,
}

impl OpusDecoder {
    pub fn new() -> Result<Self> {
        let decoder = opus::Decoder::new(WIRE_SAMPLE_RATE, opus::Channels::Mono)
            .map_err(|e| VoiceError::Codec(format!("failed to create Opus decoder: {}", e)))?;
        Ok(Self { decoder })
    }

    /// Decode one RTP payload into 48 kHz mono samples
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<f32>> {
        let mut output = vec![0f32; MAX_FRAME_SIZE];
        let len = self
            .decoder
            .decode_float(payload, &mut output, false)
            .map_err(|e| VoiceError::Codec(format!("Opus decode failed: {}", e)))?;

        output.truncate(len);
        Ok(output)
    }
}

/// Turns arbitrary capture blocks into 20 ms Opus packets
///
/// Downmixes, resamples to 48 kHz and carries leftover samples over to the
/// next block. The resampler is rebuilt if the capture rate changes.
pub struct Packetizer {
    encoder: OpusEncoder,
    resampler: Option<Resampler>,
    pending: Vec<f32>,
}

impl Packetizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            encoder: OpusEncoder::new()?,
            resampler: None,
            pending: Vec::with_capacity(FRAME_SAMPLES * 2),
        })
    }

    pub fn push(&mut self, frame: &AudioFrame) -> Result<Vec<Vec<u8>>> {
        let mono = frame.to_mono();

        if self.resampler.as_ref().map(Resampler::input_rate) != Some(frame.sample_rate) {
            self.resampler = Some(Resampler::new(frame.sample_rate, WIRE_SAMPLE_RATE));
        }
        if let Some(resampler) = self.resampler.as_mut() {
            self.pending.extend(resampler.process(&mono));
        }

        let mut packets = Vec::new();
        while self.pending.len() >= FRAME_SAMPLES {
            let chunk: Vec<f32> = self.pending.drain(..FRAME_SAMPLES).collect();
            packets.push(self.encoder.encode(&chunk)?);
        }
        Ok(packets)
    }
}

/// Encode captured frames until the capture side hangs up
///
/// Blocking; runs on its own thread so the encoder never crosses threads.
pub fn run_encoder(mut frames: AudioFrameReceiver, packets: mpsc::Sender<Vec<u8>>) {
    let mut packetizer = match Packetizer::new() {
        Ok(p) => p,
        Err(e) => {
            warn!("Uplink audio disabled: {}", e);
            return;
        }
    };

    while let Some(frame) = frames.blocking_recv() {
        let encoded = match packetizer.push(&frame) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Dropping captured audio: {}", e);
                continue;
            }
        };

        for packet in encoded {
            if packets.blocking_send(packet).is_err() {
                debug!("Packet consumer gone, stopping encoder");
                return;
            }
        }
    }

    debug!("Capture closed, stopping encoder");
}

/// Decode remote payloads into 48 kHz mono frames
///
/// Frames are dropped rather than queued when playback falls behind.
pub fn run_decoder(mut payloads: mpsc::Receiver<Vec<u8>>, frames: AudioFrameSender) {
    let mut decoder = match OpusDecoder::new() {
        Ok(d) => d,
        Err(e) => {
            warn!("Remote audio disabled: {}", e);
            return;
        }
    };

    while let Some(payload) = payloads.blocking_recv() {
        let samples = match decoder.decode(&payload) {
            Ok(samples) => samples,
            Err(e) => {
                debug!("Skipping undecodable packet: {}", e);
                continue;
            }
        };

        match frames.try_send(AudioFrame::mono(samples, WIRE_SAMPLE_RATE)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => debug!("Playback behind, dropping frame"),
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }

    debug!("Remote track closed, stopping decoder");
}
