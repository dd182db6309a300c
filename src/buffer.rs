//! Sample buffer model shared by capture outputs, the router and the recorder

use crate::errors::{DualCamError, Result};
use crate::timing::MediaTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Physical side of the device a sensor or microphone faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePosition {
    Back,
    Front,
}

impl DevicePosition {
    pub fn other(self) -> Self {
        match self {
            DevicePosition::Back => DevicePosition::Front,
            DevicePosition::Front => DevicePosition::Back,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePosition::Back => "back",
            DevicePosition::Front => "front",
        }
    }
}

impl fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

/// Which physical camera or logical microphone produced a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceId {
    Camera(DevicePosition),
    Microphone(DevicePosition),
}

impl SourceId {
    pub fn position(&self) -> DevicePosition {
        match self {
            SourceId::Camera(p) | SourceId::Microphone(p) => *p,
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            SourceId::Camera(_) => MediaKind::Video,
            SourceId::Microphone(_) => MediaKind::Audio,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Camera(p) => write!(f, "{} camera", p),
            SourceId::Microphone(p) => write!(f, "{} microphone", p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 32-bit BGRA, 4 bytes per pixel
    Bgra32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgra32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Interleaved little-endian f32
    F32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoFormat {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

impl VideoFormat {
    pub fn bgra(width: u32, height: u32) -> Self {
        Self {
            pixel_format: PixelFormat::Bgra32,
            width,
            height,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_format.bytes_per_pixel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn f32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_format: SampleFormat::F32,
            sample_rate,
            channels,
        }
    }
}

/// Format metadata attached to every buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatDescriptor {
    Video(VideoFormat),
    Audio(AudioFormat),
}

impl FormatDescriptor {
    pub fn kind(&self) -> MediaKind {
        match self {
            FormatDescriptor::Video(_) => MediaKind::Video,
            FormatDescriptor::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn video(&self) -> Option<&VideoFormat> {
        match self {
            FormatDescriptor::Video(v) => Some(v),
            FormatDescriptor::Audio(_) => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioFormat> {
        match self {
            FormatDescriptor::Audio(a) => Some(a),
            FormatDescriptor::Video(_) => None,
        }
    }
}

/// An immutable, timestamped buffer produced by a capture output.
///
/// The payload is reference counted so the compositor can hand out pooled
/// output buffers and tell when the recorder has let go of them.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    source: SourceId,
    pts: MediaTime,
    format: FormatDescriptor,
    payload: Arc<[u8]>,
}

impl SampleBuffer {
    /// Build a buffer, checking the payload against the format.
    pub fn new(
        source: SourceId,
        pts: MediaTime,
        format: FormatDescriptor,
        payload: Arc<[u8]>,
    ) -> Result<Self> {
        if source.kind() != format.kind() {
            return Err(DualCamError::Configuration(format!(
                "{} cannot carry {:?} data",
                source,
                format.kind()
            )));
        }
        match &format {
            FormatDescriptor::Video(v) => {
                if payload.len() != v.frame_size() {
                    return Err(DualCamError::Configuration(format!(
                        "video payload is {} bytes, {}x{} needs {}",
                        payload.len(),
                        v.width,
                        v.height,
                        v.frame_size()
                    )));
                }
            }
            FormatDescriptor::Audio(a) => {
                let frame_bytes = a.channels.max(1) as usize * 4;
                if payload.len() % frame_bytes != 0 {
                    return Err(DualCamError::Configuration(format!(
                        "audio payload of {} bytes is not a whole number of {}-channel frames",
                        payload.len(),
                        a.channels
                    )));
                }
            }
        }
        Ok(Self {
            source,
            pts,
            format,
            payload,
        })
    }

    pub fn video(
        position: DevicePosition,
        pts: MediaTime,
        format: VideoFormat,
        payload: impl Into<Arc<[u8]>>,
    ) -> Result<Self> {
        Self::new(
            SourceId::Camera(position),
            pts,
            FormatDescriptor::Video(format),
            payload.into(),
        )
    }

    /// Build an audio buffer from interleaved f32 samples.
    pub fn audio(
        position: DevicePosition,
        pts: MediaTime,
        format: AudioFormat,
        samples: &[f32],
    ) -> Result<Self> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(
            SourceId::Microphone(position),
            pts,
            FormatDescriptor::Audio(format),
            bytes.into(),
        )
    }

    pub fn kind(&self) -> MediaKind {
        self.format.kind()
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn pts(&self) -> MediaTime {
        self.pts
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Number of audio frames (samples per channel), zero for video.
    pub fn audio_frame_count(&self) -> usize {
        match &self.format {
            FormatDescriptor::Audio(a) => self.payload.len() / (a.channels.max(1) as usize * 4),
            FormatDescriptor::Video(_) => 0,
        }
    }

    /// Decode an audio payload back into interleaved f32 samples.
    pub fn audio_samples(&self) -> Option<Vec<f32>> {
        self.format.audio()?;
        Some(
            self.payload
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }
}

/// Level of one audio channel in dBFS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelLevel {
    pub average_power_db: f32,
    pub peak_db: f32,
}

/// Floor reported for silent channels.
pub const SILENCE_DB: f32 = -160.0;

fn to_db(amplitude: f32) -> f32 {
    if amplitude <= 0.0 {
        SILENCE_DB
    } else {
        (20.0 * amplitude.log10()).max(SILENCE_DB)
    }
}

/// Per-channel average power and peak of an audio buffer.
pub fn audio_levels(buffer: &SampleBuffer) -> Option<Vec<ChannelLevel>> {
    let format = *buffer.format().audio()?;
    let samples = buffer.audio_samples()?;
    let channels = format.channels.max(1) as usize;
    let frames = samples.len() / channels;

    let levels = (0..channels)
        .map(|ch| {
            let mut sum_sq = 0.0f64;
            let mut peak = 0.0f32;
            for frame in 0..frames {
                let s = samples[frame * channels + ch];
                sum_sq += (s as f64) * (s as f64);
                peak = peak.max(s.abs());
            }
            let rms = if frames > 0 {
                (sum_sq / frames as f64).sqrt() as f32
            } else {
                0.0
            };
            ChannelLevel {
                average_power_db: to_db(rms),
                peak_db: to_db(peak),
            }
        })
        .collect();
    Some(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_payload_size_checked() {
        let format = VideoFormat::bgra(4, 2);
        let ok = SampleBuffer::video(DevicePosition::Back, MediaTime::ZERO, format, vec![0u8; 32]);
        assert!(ok.is_ok());

        let short = SampleBuffer::video(DevicePosition::Back, MediaTime::ZERO, format, vec![0u8; 31]);
        assert!(short.is_err());
    }

    #[test]
    fn test_source_kind_must_match_format() {
        let result = SampleBuffer::new(
            SourceId::Microphone(DevicePosition::Front),
            MediaTime::ZERO,
            FormatDescriptor::Video(VideoFormat::bgra(1, 1)),
            vec![0u8; 4].into(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_audio_samples_round_trip() {
        let samples = [0.25f32, -0.5, 0.75, -1.0];
        let buffer = SampleBuffer::audio(
            DevicePosition::Front,
            MediaTime::new(1, 48_000),
            AudioFormat::f32(48_000, 2),
            &samples,
        )
        .unwrap();
        assert_eq!(buffer.audio_frame_count(), 2);
        assert_eq!(buffer.audio_samples().unwrap(), samples.to_vec());
    }

    #[test]
    fn test_audio_levels() {
        // Left channel full scale, right channel silent.
        let samples = [1.0f32, 0.0, -1.0, 0.0];
        let buffer = SampleBuffer::audio(
            DevicePosition::Back,
            MediaTime::ZERO,
            AudioFormat::f32(48_000, 2),
            &samples,
        )
        .unwrap();
        let levels = audio_levels(&buffer).unwrap();
        assert_eq!(levels.len(), 2);
        assert!(levels[0].peak_db.abs() < 1e-4);
        assert!(levels[0].average_power_db.abs() < 1e-4);
        assert_eq!(levels[1].peak_db, SILENCE_DB);
    }

    #[test]
    fn test_position_other() {
        assert_eq!(DevicePosition::Back.other(), DevicePosition::Front);
        assert_eq!(DevicePosition::Front.other(), DevicePosition::Back);
    }
}
