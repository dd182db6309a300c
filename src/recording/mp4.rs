//! MP4 movie writer: openh264 video, Opus audio, muxide container

use std::fs::File;
use std::io::BufWriter;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};
use muxide::api::{AudioCodec as MuxAudioCodec, Metadata, Muxer, MuxerBuilder, VideoCodec as MuxVideoCodec};

use super::config::{RecordingStats, VideoCodec};
use super::encoder::H264Encoder;
use super::opus::OpusEncoder;
use super::writer::{MovieWriter, MovieWriterFactory, WriterParams};
use crate::buffer::SampleBuffer;
use crate::errors::{DualCamError, Result};
use crate::timing::MediaTime;

const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Writes composite BGRA frames and forwarded microphone PCM to an MP4 file.
pub struct Mp4Writer {
    video: H264Encoder,
    audio: Option<OpusEncoder>,
    muxer: Muxer<BufWriter<File>>,
    width: u32,
    height: u32,
    output_path: String,
    video_samples: u64,
    audio_samples: u64,
}

impl Mp4Writer {
    pub fn create(params: &WriterParams) -> Result<Self> {
        let video_settings = &params.settings.video;
        if video_settings.codec != VideoCodec::H264 {
            return Err(DualCamError::Recording(format!(
                "{:?} video is not supported by the MP4 writer",
                video_settings.codec
            )));
        }

        let file = File::create(&params.path)
            .map_err(|e| DualCamError::Io(format!("Failed to create output file: {}", e)))?;
        let writer = BufWriter::new(file);

        let video = H264Encoder::new(video_settings.width, video_settings.height)?;

        let audio_settings = &params.settings.audio;
        let audio = if audio_settings.sample_rate == OPUS_SAMPLE_RATE {
            Some(OpusEncoder::new(
                audio_settings.sample_rate,
                audio_settings.channels,
                audio_settings.bit_rate,
            )?)
        } else {
            log::warn!(
                "Audio at {} Hz cannot be Opus encoded; recording video only",
                audio_settings.sample_rate
            );
            None
        };

        let mut builder = MuxerBuilder::new(writer)
            .video(
                MuxVideoCodec::H264,
                video_settings.width,
                video_settings.height,
                video_settings.expected_frame_rate,
            )
            .with_fast_start(true)
            .with_metadata(Metadata::new().with_current_time());
        if let Some(ref encoder) = audio {
            builder = builder.audio(MuxAudioCodec::Opus, OPUS_SAMPLE_RATE, encoder.channels());
        }
        let muxer = builder
            .build()
            .map_err(|e| DualCamError::Muxing(format!("Failed to create muxer: {}", e)))?;

        log::debug!(
            "MP4 writer opened {:?} ({}x{}, rotation {})",
            params.path,
            video_settings.width,
            video_settings.height,
            params.settings.transform.rotation_degrees
        );

        Ok(Self {
            video,
            audio,
            muxer,
            width: video_settings.width,
            height: video_settings.height,
            output_path: params.path.to_string_lossy().to_string(),
            video_samples: 0,
            audio_samples: 0,
        })
    }

    fn write_packets(&mut self, packets: Vec<super::opus::EncodedAudio>) -> Result<()> {
        for packet in packets {
            self.muxer
                .write_audio(packet.timestamp, &packet.data)
                .map_err(|e| DualCamError::Muxing(format!("Failed to write audio: {}", e)))?;
        }
        Ok(())
    }
}

impl MovieWriter for Mp4Writer {
    fn append_video(&mut self, pts: MediaTime, buffer: &SampleBuffer) -> Result<()> {
        let format = buffer
            .format()
            .video()
            .ok_or_else(|| DualCamError::Recording("not a video buffer".to_string()))?;
        let scaled;
        let pixels: &[u8] = if format.width == self.width && format.height == self.height {
            buffer.payload()
        } else {
            let frame: ImageBuffer<Rgba<u8>, &[u8]> =
                ImageBuffer::from_raw(format.width, format.height, buffer.payload()).ok_or_else(
                    || DualCamError::Recording("video payload too small".to_string()),
                )?;
            scaled = imageops::resize(&frame, self.width, self.height, FilterType::Triangle);
            scaled.as_raw()
        };

        if self.video_samples == 0 {
            self.video.force_keyframe();
        }
        let encoded = self.video.encode_bgra(pixels)?;
        self.muxer
            .write_video(pts.seconds(), &encoded.data, encoded.is_keyframe)
            .map_err(|e| DualCamError::Muxing(format!("Failed to write frame: {}", e)))?;
        self.video_samples += 1;
        Ok(())
    }

    fn append_audio(&mut self, pts: MediaTime, buffer: &SampleBuffer) -> Result<()> {
        let Some(encoder) = self.audio.as_mut() else {
            return Ok(());
        };
        let samples = buffer
            .audio_samples()
            .ok_or_else(|| DualCamError::Recording("not an audio buffer".to_string()))?;
        let packets = encoder.encode(&samples, pts.seconds())?;
        self.write_packets(packets)?;
        self.audio_samples += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<RecordingStats> {
        if let Some(encoder) = self.audio.as_mut() {
            let tail = encoder.flush()?;
            self.write_packets(tail)?;
        }

        let Mp4Writer {
            muxer,
            output_path,
            video_samples,
            audio_samples,
            ..
        } = *self;

        let muxer_stats = muxer
            .finish_with_stats()
            .map_err(|e| DualCamError::Muxing(format!("Failed to finalize recording: {}", e)))?;

        Ok(RecordingStats {
            video_samples,
            audio_samples,
            dropped_samples: 0,
            duration_secs: muxer_stats.duration_secs,
            bytes_written: muxer_stats.bytes_written,
            output_path,
        })
    }
}

/// Creates [`Mp4Writer`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp4WriterFactory;

impl MovieWriterFactory for Mp4WriterFactory {
    fn create(&self, params: &WriterParams) -> Result<Box<dyn MovieWriter>> {
        Ok(Box::new(Mp4Writer::create(params)?))
    }

    fn file_extension(&self) -> &'static str {
        "mp4"
    }
}
