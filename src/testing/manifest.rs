//! Movie writer that records appended samples as a JSON manifest
//!
//! Lets recorder tests inspect exactly what reached the container without
//! needing an encoder.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::errors::{DualCamError, Result};
use crate::recording::{
    MovieWriter, MovieWriterFactory, RecorderSettings, RecordingStats, WriterParams,
};
use crate::timing::MediaTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSample {
    pub pts: MediaTime,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingManifest {
    pub settings: RecorderSettings,
    pub finished: bool,
    pub video: Vec<ManifestSample>,
    pub audio: Vec<ManifestSample>,
}

pub fn read_manifest(path: &Path) -> Result<RecordingManifest> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| DualCamError::Recording(format!("Invalid manifest {:?}: {}", path, e)))
}

#[derive(Debug, Clone, Default)]
pub struct ManifestWriterFactory {
    fail_create: bool,
    fail_finish: bool,
}

impl ManifestWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn with_failing_finish(mut self) -> Self {
        self.fail_finish = true;
        self
    }
}

impl MovieWriterFactory for ManifestWriterFactory {
    fn create(&self, params: &WriterParams) -> Result<Box<dyn MovieWriter>> {
        if self.fail_create {
            return Err(DualCamError::Recording(
                "Failed to create movie writer".to_string(),
            ));
        }
        let writer = ManifestWriter {
            path: params.path.clone(),
            fail_finish: self.fail_finish,
            manifest: RecordingManifest {
                settings: params.settings.clone(),
                finished: false,
                video: Vec::new(),
                audio: Vec::new(),
            },
        };
        writer.flush()?;
        Ok(Box::new(writer))
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }
}

struct ManifestWriter {
    path: PathBuf,
    fail_finish: bool,
    manifest: RecordingManifest,
}

impl ManifestWriter {
    fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.manifest)
            .map_err(|e| DualCamError::Recording(format!("Failed to encode manifest: {}", e)))?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl MovieWriter for ManifestWriter {
    fn append_video(&mut self, pts: MediaTime, buffer: &SampleBuffer) -> Result<()> {
        self.manifest.video.push(ManifestSample {
            pts,
            bytes: buffer.payload().len(),
        });
        Ok(())
    }

    fn append_audio(&mut self, pts: MediaTime, buffer: &SampleBuffer) -> Result<()> {
        self.manifest.audio.push(ManifestSample {
            pts,
            bytes: buffer.payload().len(),
        });
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<RecordingStats> {
        if self.fail_finish {
            return Err(DualCamError::Recording(
                "Writer failed to finalize".to_string(),
            ));
        }
        self.manifest.finished = true;
        self.flush()?;

        let duration_secs = self
            .manifest
            .video
            .last()
            .map(|s| s.pts.seconds())
            .unwrap_or(0.0);
        let bytes_written = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(RecordingStats {
            video_samples: self.manifest.video.len() as u64,
            audio_samples: self.manifest.audio.len() as u64,
            dropped_samples: 0,
            duration_secs,
            bytes_written,
            output_path: self.path.to_string_lossy().to_string(),
        })
    }
}
