//! Testing utilities for dualcam
//!
//! In-memory stand-ins for the platform collaborators (capture graph,
//! devices, media library, background tasks, movie writer) plus synthetic
//! capture buffers, so every layer can be exercised without hardware.

mod devices;
mod graph;
mod manifest;
mod services;
pub mod synthetic_data;

pub use devices::{standard_formats, DeviceMutation, FakeCaptureDevice, FakeDeviceDiscovery};
pub use graph::FakeCaptureGraph;
pub use manifest::{read_manifest, ManifestSample, ManifestWriterFactory, RecordingManifest};
pub use services::{FakeBackgroundTaskHost, FakeMediaLibrary};
pub use synthetic_data::{synthetic_audio_buffer, synthetic_video_buffer, CaptureCharacteristics};
