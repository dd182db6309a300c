//! dualcam: dual-camera picture-in-picture capture core
//!
//! Drives two simultaneous cameras and a two-port microphone through one
//! capture graph, composites the inset camera over the full-screen camera
//! and records the composite plus the full-screen side's audio into a
//! single movie file.
//!
//! # Features
//! - Explicit capture graph construction with all-or-nothing rollback
//! - Hardware and thermal cost monitoring with a staged degradation ladder
//! - Per-frame routing and picture-in-picture compositing
//! - Movie recording with media-library hand-off
//! - Session lifecycle across interruptions, runtime errors and backgrounding
//!
//! # Usage
//! ```toml
//! [dependencies]
//! dualcam = { version = "0.3", features = ["recording"] }
//! ```
//!
//! The platform supplies a [`graph::CaptureGraph`], a
//! [`graph::DeviceDiscovery`] and the recording services; the
//! [`session::SessionController`] does the rest:
//! ```rust,ignore
//! let (controller, mut events) = SessionController::new(graph, collaborators, config)?;
//! controller.configure_and_start()?;
//! // for every captured sample buffer:
//! controller.deliver(buffer);
//! ```

pub mod buffer;
pub mod config;
pub mod cost;
pub mod errors;
pub mod graph;
pub mod recording;
pub mod routing;
pub mod session;
pub mod timing;

// Testing utilities - fake platform collaborators for offline testing
pub mod testing;

// Re-exports for convenience
pub use buffer::{DevicePosition, MediaKind, SampleBuffer, SourceId};
pub use config::DualCamConfig;
pub use cost::{CostMonitor, DegradationReport, DegradationStep};
pub use errors::{DualCamError, Result};
pub use graph::{CaptureDevice, CaptureGraph, CostState, DeviceDiscovery};
pub use recording::{MovieRecorder, RecorderSettings, RecordingStats};
pub use routing::{FrameRouter, PipCompositor, PipState};
pub use session::{
    SessionCollaborators, SessionController, SessionEvent, SessionSetupResult, SessionState,
};
pub use timing::MediaTime;

/// Initialize logging for the capture core
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "dualcam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        recording_enabled: cfg!(feature = "recording"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Built with the MP4 encoding backend
    pub recording_enabled: bool,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "dualcam");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }
}
