//! Synthetic capture buffers
//!
//! Video frames carry a gradient that shifts every frame so consecutive
//! frames never compare equal; audio is a 440 Hz sine at a level well below
//! clipping.

use crate::buffer::{AudioFormat, DevicePosition, SampleBuffer, VideoFormat};
use crate::errors::Result;
use crate::timing::MediaTime;

/// Capture characteristics of a typical phone camera pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureCharacteristics {
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_rate: f64,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    /// Samples per channel in one audio buffer
    pub audio_buffer_frames: usize,
}

impl Default for CaptureCharacteristics {
    fn default() -> Self {
        Self {
            frame_width: 1920,
            frame_height: 1080,
            frame_rate: 30.0,
            audio_sample_rate: 48_000,
            audio_channels: 1,
            audio_buffer_frames: 1024,
        }
    }
}

/// BGRA frame number `frame_number` from the camera at `position`, stamped
/// at `frame_number / fps`.
pub fn synthetic_video_buffer(
    position: DevicePosition,
    frame_number: u64,
    width: u32,
    height: u32,
    fps: i32,
) -> Result<SampleBuffer> {
    let mut data = vec![0u8; (width * height * 4) as usize];

    // Front frames are tinted so composites show both sources.
    let base = (frame_number % 256) as u8;
    let tint = match position {
        DevicePosition::Back => 0u8,
        DevicePosition::Front => 128u8,
    };
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 4) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = tint.wrapping_add(((x + y) % 256) as u8);
            data[idx + 3] = 255;
        }
    }

    let pts = MediaTime::new(frame_number as i64, fps);
    SampleBuffer::video(position, pts, VideoFormat::bgra(width, height), data)
}

/// Mono or multi-channel f32 buffer number `buffer_number` from the
/// microphone port at `position`.
pub fn synthetic_audio_buffer(
    position: DevicePosition,
    buffer_number: u64,
    frames: usize,
    sample_rate: u32,
    channels: u16,
) -> Result<SampleBuffer> {
    let frequency = 440.0;
    let channels_usize = channels as usize;
    let mut samples = vec![0.0f32; frames * channels_usize];

    let first_frame = buffer_number * frames as u64;
    for i in 0..frames {
        let t = (first_frame + i as u64) as f64 / sample_rate as f64;
        let value = (2.0 * std::f64::consts::PI * frequency * t).sin() as f32 * 0.3;
        for c in 0..channels_usize {
            samples[i * channels_usize + c] = value;
        }
    }

    let pts = MediaTime::new(first_frame as i64, sample_rate as i32);
    SampleBuffer::audio(position, pts, AudioFormat::f32(sample_rate, channels), &samples)
}
