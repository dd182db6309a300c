//! Movie recording for the composite feed
//!
//! [`MovieRecorder`] is an explicit idle/recording state machine that hands
//! samples to a [`MovieWriter`]. With the `recording` feature enabled,
//! [`Mp4WriterFactory`] produces MP4 files using:
//! - openh264 for H.264 encoding
//! - libopus for Opus audio
//! - muxide for MP4 muxing
//!
//! # Example
//! ```rust,ignore
//! use dualcam::recording::{MovieRecorder, Mp4WriterFactory};
//!
//! let mut recorder = MovieRecorder::new(Arc::new(Mp4WriterFactory), temp_dir, "pip");
//! recorder.start(settings)?;
//!
//! // On the data-delivery queue:
//! recorder.record_video(&composite);
//! recorder.record_audio(&microphone);
//!
//! recorder.stop(|outcome| println!("{:?}", outcome));
//! ```

mod config;
mod library;
mod recorder;
mod writer;

#[cfg(feature = "recording")]
mod encoder;
#[cfg(feature = "recording")]
mod mp4;
#[cfg(feature = "recording")]
mod opus;

pub use config::{
    AudioCodec, AudioSettings, RecorderSettings, RecordingStats, VideoCodec, VideoSettings,
    VideoTransform,
};
pub use library::{
    save_recording, BackgroundTaskGuard, BackgroundTaskHost, BackgroundTaskId, MediaLibrary,
    ResourceKind,
};
pub use recorder::{MovieRecorder, RecorderState, RecordingOutcome};
pub use writer::{MovieWriter, MovieWriterFactory, WriterParams};

#[cfg(feature = "recording")]
pub use encoder::{EncodedFrame, H264Encoder};
#[cfg(feature = "recording")]
pub use mp4::{Mp4Writer, Mp4WriterFactory};
#[cfg(feature = "recording")]
pub use opus::{EncodedAudio, OpusEncoder};
