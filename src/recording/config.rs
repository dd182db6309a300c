//! Writer settings and recording statistics

use crate::errors::{DualCamError, Result};
use crate::graph::VideoOrientation;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Opus,
}

/// Video track settings, as recommended by a video data output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second
    pub average_bit_rate: u32,
    pub expected_frame_rate: f64,
    pub max_key_frame_interval: u32,
}

impl VideoSettings {
    pub fn h264(width: u32, height: u32, expected_frame_rate: f64) -> Self {
        Self {
            codec: VideoCodec::H264,
            width,
            height,
            average_bit_rate: default_video_bitrate(width, height),
            expected_frame_rate,
            max_key_frame_interval: expected_frame_rate.max(1.0) as u32,
        }
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.average_bit_rate = bit_rate;
        self
    }
}

fn default_video_bitrate(width: u32, height: u32) -> u32 {
    match width.max(height) {
        0..=640 => 1_500_000,
        641..=1280 => 2_500_000,
        1281..=1920 => 5_000_000,
        _ => 10_000_000,
    }
}

/// Audio track settings, as recommended by an audio data output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioSettings {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u32,
}

impl AudioSettings {
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u16) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
            bit_rate: 128_000,
        }
    }
}

/// Rotation applied to the video track so playback matches the device
/// orientation at the time recording started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoTransform {
    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    pub rotation_degrees: u32,
}

impl VideoTransform {
    pub const IDENTITY: VideoTransform = VideoTransform {
        rotation_degrees: 0,
    };

    /// Transform from the orientation frames are captured in to the
    /// orientation the device is held in.
    pub fn between(capture: VideoOrientation, device: VideoOrientation) -> Self {
        Self {
            rotation_degrees: (device.degrees() + 360 - capture.degrees()) % 360,
        }
    }

    /// Row-major 2x2 rotation matrix for the track header.
    pub fn matrix(&self) -> [[i32; 2]; 2] {
        match self.rotation_degrees {
            90 => [[0, 1], [-1, 0]],
            180 => [[-1, 0], [0, -1]],
            270 => [[0, -1], [1, 0]],
            _ => [[1, 0], [0, 1]],
        }
    }
}

impl Default for VideoTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Settings handed to the recorder at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderSettings {
    pub audio: AudioSettings,
    pub video: VideoSettings,
    pub transform: VideoTransform,
}

impl RecorderSettings {
    /// Settings recommended for both sources of a track must agree; the
    /// recorder never silently picks one side.
    pub fn from_recommendations(
        back_audio: Option<AudioSettings>,
        front_audio: Option<AudioSettings>,
        back_video: Option<VideoSettings>,
        front_video: Option<VideoSettings>,
        transform: VideoTransform,
    ) -> Result<Self> {
        Ok(Self {
            audio: identical("audio", back_audio, front_audio)?,
            video: identical("video", back_video, front_video)?,
            transform,
        })
    }
}

fn identical<T: PartialEq + Debug>(track: &str, back: Option<T>, front: Option<T>) -> Result<T> {
    let back = back.ok_or_else(|| {
        DualCamError::SettingsMismatch(format!("no recommended {} settings for back source", track))
    })?;
    let front = front.ok_or_else(|| {
        DualCamError::SettingsMismatch(format!("no recommended {} settings for front source", track))
    })?;
    if back != front {
        log::error!(
            "Front and back {} settings differ: {:?} vs {:?}",
            track,
            front,
            back
        );
        return Err(DualCamError::SettingsMismatch(format!(
            "front and back {} settings are not equal",
            track
        )));
    }
    Ok(back)
}

/// Statistics returned after finishing a recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingStats {
    /// Total number of video samples written
    pub video_samples: u64,
    /// Total number of audio samples written
    pub audio_samples: u64,
    /// Samples dropped by the recorder (late, out of order, or rejected)
    pub dropped_samples: u64,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Total bytes written to file
    pub bytes_written: u64,
    /// Output file path
    pub output_path: String,
}

impl RecordingStats {
    /// Calculate the average bitrate achieved
    pub fn avg_bitrate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.bytes_written as f64 * 8.0) / self.duration_secs
        } else {
            0.0
        }
    }
}
