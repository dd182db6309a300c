//! Opus audio encoder
//!
//! # Spell: AudioEncodeOpus
//! ^ Intent: turn forwarded microphone PCM into Opus packets for the MP4 audio track
//!
//! - accepts interleaved f32 at 48 kHz, mono or stereo
//! - emits one packet per 20 ms frame
//! - flush pads the tail with silence
//! - packet timestamps are relative to the first encoded sample

use crate::errors::{DualCamError, Result};

/// 20 ms at 48 kHz, per channel.
const OPUS_FRAME_SAMPLES: usize = 960;

/// OPUS_APPLICATION_AUDIO
const OPUS_APPLICATION_AUDIO: i32 = 2049;

const MAX_PACKET_BYTES: usize = 4000;

#[derive(Debug, Clone)]
pub struct EncodedAudio {
    pub data: Vec<u8>,
    /// Seconds from the first sample handed to the encoder
    pub timestamp: f64,
    pub duration: f64,
}

/// libopus encoder handle.
///
/// Owned by exactly one writer, which lives on the data-delivery queue.
/// Not `Sync`.
pub struct OpusEncoder {
    encoder: *mut libopus_sys::OpusEncoder,
    channels: u16,
    sample_rate: u32,
    pending: Vec<f32>,
    /// Timestamp of the first sample ever handed in; never updated.
    start_pts: Option<f64>,
    samples_encoded: u64,
}

// SAFETY: the raw encoder is only touched through `&mut self`, and the type is
// not `Sync`, so it is never used from two threads at once.
unsafe impl Send for OpusEncoder {}

impl OpusEncoder {
    pub fn new(sample_rate: u32, channels: u16, bitrate: u32) -> Result<Self> {
        if sample_rate != 48_000 {
            return Err(DualCamError::Encoding(
                "Opus requires 48000 Hz sample rate".to_string(),
            ));
        }
        if channels != 1 && channels != 2 {
            return Err(DualCamError::Encoding(
                "Opus supports only mono (1) or stereo (2) channels".to_string(),
            ));
        }

        let mut error: i32 = 0;
        let encoder = unsafe {
            libopus_sys::opus_encoder_create(
                sample_rate as i32,
                channels as i32,
                OPUS_APPLICATION_AUDIO,
                &mut error,
            )
        };
        if encoder.is_null() || error != 0 {
            return Err(DualCamError::Encoding(format!(
                "Failed to create Opus encoder: error code {}",
                error
            )));
        }

        let result = unsafe {
            libopus_sys::opus_encoder_ctl(
                encoder,
                libopus_sys::OPUS_SET_BITRATE_REQUEST as i32,
                bitrate as i32,
            )
        };
        if result != 0 {
            unsafe { libopus_sys::opus_encoder_destroy(encoder) };
            return Err(DualCamError::Encoding(format!(
                "Failed to set bitrate: error code {}",
                result
            )));
        }

        Ok(Self {
            encoder,
            channels,
            sample_rate,
            pending: Vec::with_capacity(OPUS_FRAME_SAMPLES * channels as usize * 2),
            start_pts: None,
            samples_encoded: 0,
        })
    }

    /// Queue interleaved samples and encode every complete frame.
    pub fn encode(&mut self, samples: &[f32], timestamp: f64) -> Result<Vec<EncodedAudio>> {
        if samples.len() % self.channels as usize != 0 {
            return Err(DualCamError::Encoding(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                self.channels
            )));
        }
        if self.start_pts.is_none() && !samples.is_empty() {
            self.start_pts = Some(timestamp);
        }
        self.pending.extend_from_slice(samples);
        self.drain_frames()
    }

    /// Encode whatever is left, padded with silence to a whole frame.
    pub fn flush(&mut self) -> Result<Vec<EncodedAudio>> {
        let per_frame = OPUS_FRAME_SAMPLES * self.channels as usize;
        let remainder = self.pending.len() % per_frame;
        if remainder != 0 {
            self.pending.resize(self.pending.len() + per_frame - remainder, 0.0);
        }
        self.drain_frames()
    }

    fn drain_frames(&mut self) -> Result<Vec<EncodedAudio>> {
        let per_frame = OPUS_FRAME_SAMPLES * self.channels as usize;
        let frame_duration = OPUS_FRAME_SAMPLES as f64 / self.sample_rate as f64;
        let mut packets = Vec::new();

        while self.pending.len() >= per_frame {
            let frame: Vec<f32> = self.pending.drain(..per_frame).collect();
            let offset = self.samples_encoded as f64 / self.sample_rate as f64;

            let mut output = vec![0u8; MAX_PACKET_BYTES];
            let len = unsafe {
                libopus_sys::opus_encode_float(
                    self.encoder,
                    frame.as_ptr(),
                    OPUS_FRAME_SAMPLES as i32,
                    output.as_mut_ptr(),
                    output.len() as i32,
                )
            };
            if len < 0 {
                return Err(DualCamError::Encoding(format!(
                    "Opus encoding failed: error code {}",
                    len
                )));
            }
            output.truncate(len as usize);

            packets.push(EncodedAudio {
                data: output,
                timestamp: self.start_pts.unwrap_or(0.0) + offset,
                duration: frame_duration,
            });
            self.samples_encoded += OPUS_FRAME_SAMPLES as u64;
        }

        Ok(packets)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for OpusEncoder {
    fn drop(&mut self) {
        if !self.encoder.is_null() {
            unsafe {
                libopus_sys::opus_encoder_destroy(self.encoder);
            }
        }
    }
}
