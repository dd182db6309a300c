//! Capture session lifecycle
//!
//! [`builder`] assembles the capture graph, [`SessionController`] runs it on
//! two serial queues: one for configuration, one for frame delivery.

mod builder;
mod controller;
mod events;
mod queue;

pub use builder::{
    configure, CameraPipeline, GraphTopology, MicrophonePipeline, SessionSetupResult, SetupOutcome,
};
pub use controller::{
    InterruptionReason, RuntimeError, SessionCollaborators, SessionController, SessionState,
};
pub use events::{EventReceiver, SessionEvent};
pub use queue::SerialQueue;

#[cfg(test)]
mod tests;
