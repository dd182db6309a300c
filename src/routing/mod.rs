//! Frame routing and picture-in-picture compositing
//!
//! Runs entirely on the data-delivery queue. Each buffer is classified as
//! full-screen or inset from the current [`PipState`]; inset frames are
//! cached, full-screen frames are blended with the cached inset, and only the
//! full-screen side's microphone reaches the recorder.

mod compositor;
mod pip;
mod router;

pub use compositor::PipCompositor;
pub use pip::{NormalizedRect, PipState, PixelRect, PreviewLayout, ViewRect};
pub use router::{classify, DropReason, FrameRouter, Role, Routed};
