use thiserror::Error;

/// Errors surfaced by the dual-camera core.
///
/// Setup outcomes are reported through [`crate::session::SessionSetupResult`];
/// this type carries the reason behind a failed step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DualCamError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Device error: {0}")]
    Device(String),
    #[error("Capture graph error: {0}")]
    Graph(String),
    #[error("Device lock failed: {0}")]
    DeviceLock(String),
    #[error("Compositing error: {0}")]
    Compositing(String),
    #[error("Recording error: {0}")]
    Recording(String),
    #[error("Writer settings mismatch: {0}")]
    SettingsMismatch(String),
    #[cfg(feature = "recording")]
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[cfg(feature = "recording")]
    #[error("Muxing error: {0}")]
    Muxing(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Media library error: {0}")]
    MediaLibrary(String),
    #[error("Session error: {0}")]
    Session(String),
}

impl DualCamError {
    /// True for errors that belong to the configuration-failed class of
    /// setup outcomes.
    pub fn is_configuration_class(&self) -> bool {
        matches!(
            self,
            DualCamError::Configuration(_)
                | DualCamError::Device(_)
                | DualCamError::Graph(_)
                | DualCamError::SettingsMismatch(_)
        )
    }
}

impl From<std::io::Error> for DualCamError {
    fn from(e: std::io::Error) -> Self {
        DualCamError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DualCamError>;
