//! Two-state movie recorder
//!
//! `Idle -> Recording` on [`MovieRecorder::start`], `Recording -> Idle` on
//! [`MovieRecorder::stop`]. Appends are dropped while idle. Only the
//! data-delivery queue calls into a recorder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::config::{RecorderSettings, RecordingStats};
use super::writer::{MovieWriter, MovieWriterFactory, WriterParams};
use crate::buffer::{MediaKind, SampleBuffer};
use crate::errors::{DualCamError, Result};
use crate::timing::MediaTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Result of a completed recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOutcome {
    pub path: PathBuf,
    pub stats: RecordingStats,
}

struct RecordingSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    writer: Box<dyn MovieWriter>,
    path: PathBuf,
    /// PTS of the first video sample; the track timeline starts here.
    start_pts: Option<MediaTime>,
    last_video_pts: Option<MediaTime>,
    last_audio_pts: Option<MediaTime>,
    video_samples: u64,
    audio_samples: u64,
    dropped_samples: u64,
}

impl RecordingSession {
    fn append(&mut self, buffer: &SampleBuffer) {
        let kind = buffer.kind();

        let start = match (self.start_pts, kind) {
            (Some(start), _) => start,
            (None, MediaKind::Video) => {
                self.start_pts = Some(buffer.pts());
                buffer.pts()
            }
            (None, MediaKind::Audio) => {
                // Track timeline starts at the first video frame.
                self.dropped_samples += 1;
                return;
            }
        };

        if buffer.pts() < start {
            self.dropped_samples += 1;
            return;
        }
        let relative = buffer.pts().saturating_sub(start);

        let last = match kind {
            MediaKind::Video => &mut self.last_video_pts,
            MediaKind::Audio => &mut self.last_audio_pts,
        };
        if let Some(previous) = *last {
            if relative <= previous {
                log::debug!(
                    "Dropping {:?} sample at {}: not after previous {}",
                    kind,
                    relative,
                    previous
                );
                self.dropped_samples += 1;
                return;
            }
        }

        let result = match kind {
            MediaKind::Video => self.writer.append_video(relative, buffer),
            MediaKind::Audio => self.writer.append_audio(relative, buffer),
        };

        match result {
            Ok(()) => {
                *last = Some(relative);
                match kind {
                    MediaKind::Video => self.video_samples += 1,
                    MediaKind::Audio => self.audio_samples += 1,
                }
            }
            Err(e) => {
                log::warn!("Failed to append {:?} sample: {}", kind, e);
                self.dropped_samples += 1;
            }
        }
    }
}

/// Records composite video plus the selected microphone into one file.
pub struct MovieRecorder {
    factory: Arc<dyn MovieWriterFactory>,
    output_directory: PathBuf,
    file_prefix: String,
    session: Option<RecordingSession>,
}

impl MovieRecorder {
    pub fn new(
        factory: Arc<dyn MovieWriterFactory>,
        output_directory: impl Into<PathBuf>,
        file_prefix: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            output_directory: output_directory.into(),
            file_prefix: file_prefix.into(),
            session: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        if self.session.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Path of the file being written, while recording.
    pub fn current_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    /// Identifier of the active recording session.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Begin recording. Returns `Ok(false)` without touching the active
    /// session when already recording.
    pub fn start(&mut self, settings: RecorderSettings) -> Result<bool> {
        if self.session.is_some() {
            log::warn!("Recorder already recording; ignoring start");
            return Ok(false);
        }

        std::fs::create_dir_all(&self.output_directory).map_err(|e| {
            DualCamError::Recording(format!(
                "Failed to create output directory {:?}: {}",
                self.output_directory, e
            ))
        })?;

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let file_name = format!(
            "{}_{}_{}.{}",
            self.file_prefix,
            started_at.format("%Y%m%d_%H%M%S"),
            id.simple(),
            self.factory.file_extension()
        );
        let path = self.output_directory.join(file_name);

        let params = WriterParams {
            path: path.clone(),
            settings,
        };
        let writer = self.factory.create(&params)?;

        log::info!("Recording started: {} -> {:?}", id, path);
        self.session = Some(RecordingSession {
            id,
            started_at,
            writer,
            path,
            start_pts: None,
            last_video_pts: None,
            last_audio_pts: None,
            video_samples: 0,
            audio_samples: 0,
            dropped_samples: 0,
        });
        Ok(true)
    }

    pub fn record_video(&mut self, buffer: &SampleBuffer) {
        if buffer.kind() != MediaKind::Video {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.append(buffer);
        }
    }

    pub fn record_audio(&mut self, buffer: &SampleBuffer) {
        if buffer.kind() != MediaKind::Audio {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.append(buffer);
        }
    }

    /// Finish the recording and report the file through `completion`,
    /// exactly once. Returns `false` (and drops `completion` uncalled) when
    /// idle.
    pub fn stop<F>(&mut self, completion: F) -> bool
    where
        F: FnOnce(Result<RecordingOutcome>),
    {
        let Some(session) = self.session.take() else {
            log::debug!("Recorder idle; ignoring stop");
            return false;
        };

        let RecordingSession {
            id,
            started_at,
            writer,
            path,
            video_samples,
            audio_samples,
            dropped_samples,
            ..
        } = session;

        let elapsed = Utc::now().signed_duration_since(started_at);
        log::info!(
            "Stopping recording {} after {}ms ({} video, {} audio, {} dropped)",
            id,
            elapsed.num_milliseconds(),
            video_samples,
            audio_samples,
            dropped_samples
        );

        let result = writer.finish().map(|mut stats| {
            stats.dropped_samples += dropped_samples;
            if stats.output_path.is_empty() {
                stats.output_path = path.to_string_lossy().to_string();
            }
            RecordingOutcome {
                path: path.clone(),
                stats,
            }
        });

        if let Err(ref e) = result {
            log::error!("Failed to finalize recording {:?}: {}", path, e);
        }
        completion(result);
        true
    }
}

impl Drop for MovieRecorder {
    fn drop(&mut self) {
        if self.session.is_some() {
            log::warn!("Recorder dropped while recording; finalizing");
            self.stop(|_| {});
        }
    }
}
