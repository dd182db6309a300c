//! Events published to the UI layer

use tokio::sync::mpsc;

use super::SessionSetupResult;
use crate::buffer::{ChannelLevel, DevicePosition};
use crate::routing::{NormalizedRect, PipState};
use std::path::PathBuf;

/// UI-visible state changes. Delivered over an unbounded channel in the
/// order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Outcome of a failed configure, emitted once.
    SetupFailed {
        result: SessionSetupResult,
        reason: String,
    },
    RunningChanged(bool),
    /// The record control may be used.
    RecordAvailabilityChanged(bool),
    RecordingStarted {
        path: PathBuf,
    },
    RecordingFinished {
        path: PathBuf,
    },
    RecordingFailed(String),
    RecordingSaved,
    /// The finished movie could not be saved; it is kept at `path`.
    SaveFailed {
        path: PathBuf,
        reason: String,
    },
    PipChanged {
        state: PipState,
        inset_rect: Option<NormalizedRect>,
    },
    ShowResumeButton(bool),
    ShowCameraUnavailable(bool),
    ResumeFailed,
    AudioLevels {
        position: DevicePosition,
        levels: Vec<ChannelLevel>,
    },
}

pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("No UI listening for session events");
        }
    }
}
