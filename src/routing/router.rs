//! Per-buffer routing between the compositor and the recorder

use super::compositor::PipCompositor;
use super::pip::{NormalizedRect, PipState};
use crate::buffer::{MediaKind, SampleBuffer, SourceId, VideoFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    FullScreen,
    Inset,
}

/// Role of a buffer's source under the given PiP state. Microphones follow
/// the camera on the same side.
pub fn classify(pip: PipState, source: SourceId) -> Role {
    if source.position() == pip.inset_position() {
        Role::Inset
    } else {
        Role::FullScreen
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    RenderingDisabled,
    NoInsetFrame,
    CompositeFailed,
    InsetMicrophone,
}

/// What became of a routed buffer.
#[derive(Debug, Clone)]
pub enum Routed {
    /// Composite frame for the video track.
    Composite(SampleBuffer),
    /// Full-screen-side microphone audio for the audio track.
    Audio(SampleBuffer),
    /// Stored as the latest inset frame.
    InsetCached,
    Dropped(DropReason),
}

/// Routing state owned by the data-delivery queue.
#[derive(Debug)]
pub struct FrameRouter {
    pip: PipState,
    inset_rect: NormalizedRect,
    rendering_enabled: bool,
    current_inset: Option<SampleBuffer>,
    compositor: PipCompositor,
    retained_buffer_hint: usize,
    video_track_format: Option<VideoFormat>,
}

impl FrameRouter {
    pub fn new(pip: PipState, retained_buffer_hint: usize) -> Self {
        Self {
            pip,
            inset_rect: NormalizedRect::default(),
            rendering_enabled: true,
            current_inset: None,
            compositor: PipCompositor::new(),
            retained_buffer_hint,
            video_track_format: None,
        }
    }

    pub fn pip(&self) -> PipState {
        self.pip
    }

    pub fn set_pip(&mut self, pip: PipState) {
        self.pip = pip;
    }

    pub fn inset_rect(&self) -> NormalizedRect {
        self.inset_rect
    }

    pub fn set_inset_rect(&mut self, rect: NormalizedRect) {
        self.inset_rect = rect;
    }

    pub fn rendering_enabled(&self) -> bool {
        self.rendering_enabled
    }

    pub fn set_rendering_enabled(&mut self, enabled: bool) {
        self.rendering_enabled = enabled;
    }

    /// Stop rendering and drop everything the compositor path holds.
    pub fn enter_background(&mut self) {
        self.rendering_enabled = false;
        self.compositor.reset();
        self.current_inset = None;
    }

    pub fn enter_foreground(&mut self) {
        self.rendering_enabled = true;
    }

    pub fn has_inset_frame(&self) -> bool {
        self.current_inset.is_some()
    }

    /// Format of composite frames: the first video format seen.
    pub fn video_track_format(&self) -> Option<VideoFormat> {
        self.video_track_format
    }

    pub fn compositor(&self) -> &PipCompositor {
        &self.compositor
    }

    pub fn route(&mut self, buffer: SampleBuffer) -> Routed {
        match buffer.kind() {
            MediaKind::Video => self.route_video(buffer),
            MediaKind::Audio => self.route_audio(buffer),
        }
    }

    fn route_video(&mut self, buffer: SampleBuffer) -> Routed {
        if self.video_track_format.is_none() {
            self.video_track_format = buffer.format().video().copied();
        }

        match classify(self.pip, buffer.source()) {
            Role::Inset => {
                if !self.rendering_enabled {
                    return Routed::Dropped(DropReason::RenderingDisabled);
                }
                self.current_inset = Some(buffer);
                Routed::InsetCached
            }
            Role::FullScreen => self.composite(buffer),
        }
    }

    fn composite(&mut self, full_screen: SampleBuffer) -> Routed {
        if !self.rendering_enabled {
            return Routed::Dropped(DropReason::RenderingDisabled);
        }
        let Some(inset) = self.current_inset.as_ref() else {
            return Routed::Dropped(DropReason::NoInsetFrame);
        };

        if !self.compositor.is_prepared() {
            let Some(format) = self.video_track_format else {
                return Routed::Dropped(DropReason::CompositeFailed);
            };
            if let Err(e) = self.compositor.prepare(format, self.retained_buffer_hint) {
                log::warn!("Could not prepare compositor: {}", e);
                return Routed::Dropped(DropReason::CompositeFailed);
            }
        }

        match self.compositor.mix(
            &full_screen,
            inset,
            self.inset_rect,
            self.pip.full_screen_is_secondary(),
        ) {
            Some(composite) => Routed::Composite(composite),
            None => Routed::Dropped(DropReason::CompositeFailed),
        }
    }

    fn route_audio(&mut self, buffer: SampleBuffer) -> Routed {
        match classify(self.pip, buffer.source()) {
            Role::FullScreen => Routed::Audio(buffer),
            Role::Inset => Routed::Dropped(DropReason::InsetMicrophone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{AudioFormat, DevicePosition};
    use crate::timing::MediaTime;

    fn video(position: DevicePosition, pts: i64) -> SampleBuffer {
        SampleBuffer::video(
            position,
            MediaTime::new(pts, 30),
            VideoFormat::bgra(4, 4),
            vec![0u8; 64],
        )
        .unwrap()
    }

    fn audio(position: DevicePosition) -> SampleBuffer {
        SampleBuffer::audio(position, MediaTime::ZERO, AudioFormat::f32(48_000, 1), &[0.0; 4])
            .unwrap()
    }

    #[test]
    fn test_classification_table() {
        use crate::buffer::DevicePosition::{Back, Front};
        let cases = [
            (PipState::FrontIsInset, Back, Role::FullScreen),
            (PipState::FrontIsInset, Front, Role::Inset),
            (PipState::BackIsInset, Back, Role::Inset),
            (PipState::BackIsInset, Front, Role::FullScreen),
        ];
        for (pip, position, role) in cases {
            assert_eq!(classify(pip, SourceId::Camera(position)), role);
            assert_eq!(classify(pip, SourceId::Microphone(position)), role);
        }
    }

    #[test]
    fn test_full_screen_waits_for_inset() {
        let mut router = FrameRouter::new(PipState::FrontIsInset, 3);
        assert!(matches!(
            router.route(video(DevicePosition::Back, 1)),
            Routed::Dropped(DropReason::NoInsetFrame)
        ));
        assert!(matches!(
            router.route(video(DevicePosition::Front, 1)),
            Routed::InsetCached
        ));
        match router.route(video(DevicePosition::Back, 2)) {
            Routed::Composite(frame) => assert_eq!(frame.pts(), MediaTime::new(2, 30)),
            other => panic!("expected composite, got {:?}", other),
        }
    }

    #[test]
    fn test_only_full_screen_microphone_forwarded() {
        let mut router = FrameRouter::new(PipState::FrontIsInset, 3);
        assert!(matches!(
            router.route(audio(DevicePosition::Back)),
            Routed::Audio(_)
        ));
        assert!(matches!(
            router.route(audio(DevicePosition::Front)),
            Routed::Dropped(DropReason::InsetMicrophone)
        ));

        router.set_pip(router.pip().toggled());
        assert!(matches!(
            router.route(audio(DevicePosition::Front)),
            Routed::Audio(_)
        ));
    }

    #[test]
    fn test_background_clears_inset_and_compositor() {
        let mut router = FrameRouter::new(PipState::FrontIsInset, 3);
        router.route(video(DevicePosition::Front, 1));
        router.route(video(DevicePosition::Back, 1));
        assert!(router.compositor().is_prepared());

        router.enter_background();
        assert!(!router.has_inset_frame());
        assert!(!router.compositor().is_prepared());
        assert!(matches!(
            router.route(video(DevicePosition::Front, 2)),
            Routed::Dropped(DropReason::RenderingDisabled)
        ));

        router.enter_foreground();
        assert!(matches!(
            router.route(video(DevicePosition::Back, 3)),
            Routed::Dropped(DropReason::NoInsetFrame)
        ));
    }
}
