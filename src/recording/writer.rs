//! Muxer seam between the recorder and a concrete container writer

use super::config::{RecorderSettings, RecordingStats};
use crate::buffer::SampleBuffer;
use crate::errors::Result;
use crate::timing::MediaTime;
use std::path::PathBuf;

/// Everything a writer needs to open its output file.
#[derive(Debug, Clone)]
pub struct WriterParams {
    pub path: PathBuf,
    pub settings: RecorderSettings,
}

/// Single-writer container muxer with one video and one audio track.
///
/// Timestamps passed in are relative to the start of the recording and
/// strictly increasing per track.
pub trait MovieWriter: Send {
    fn append_video(&mut self, pts: MediaTime, buffer: &SampleBuffer) -> Result<()>;
    fn append_audio(&mut self, pts: MediaTime, buffer: &SampleBuffer) -> Result<()>;
    /// Flush and close the file.
    fn finish(self: Box<Self>) -> Result<RecordingStats>;
}

pub trait MovieWriterFactory: Send + Sync {
    fn create(&self, params: &WriterParams) -> Result<Box<dyn MovieWriter>>;

    fn file_extension(&self) -> &'static str {
        "mov"
    }
}
