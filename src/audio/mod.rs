//! PCM plumbing between the sound card and the Opus wire format

pub mod codec;
pub mod frame;

pub use codec::{run_decoder, run_encoder, OpusDecoder, OpusEncoder, Packetizer};
pub use frame::{
    frame_channel, AudioFrame, AudioFrameReceiver, AudioFrameSender, PlaybackBuffer, Resampler,
    FRAME_DURATION_MS, FRAME_QUEUE_DEPTH, FRAME_SAMPLES, WIRE_SAMPLE_RATE,
};
