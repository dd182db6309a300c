//! Picture-in-picture state and inset geometry

use crate::buffer::DevicePosition;
use serde::{Deserialize, Serialize};

/// Which camera is drawn in the inset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipState {
    BackIsInset,
    #[default]
    FrontIsInset,
}

impl PipState {
    pub fn with_inset(position: DevicePosition) -> Self {
        match position {
            DevicePosition::Back => PipState::BackIsInset,
            DevicePosition::Front => PipState::FrontIsInset,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            PipState::BackIsInset => PipState::FrontIsInset,
            PipState::FrontIsInset => PipState::BackIsInset,
        }
    }

    pub fn inset_position(self) -> DevicePosition {
        match self {
            PipState::BackIsInset => DevicePosition::Back,
            PipState::FrontIsInset => DevicePosition::Front,
        }
    }

    pub fn full_screen_position(self) -> DevicePosition {
        self.inset_position().other()
    }

    /// The composite's primary camera is the front one.
    pub fn full_screen_is_secondary(self) -> bool {
        self.full_screen_position() == DevicePosition::Front
    }
}

/// Axis-aligned rectangle in view points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Rectangle in the full-screen view's unit space: (0,0) is its top-left,
/// (1,1) its bottom-right. May extend outside 0..1.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Pixel-space rectangle, already clipped to its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl NormalizedRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Scale into a `frame_width`×`frame_height` frame and clip to it.
    /// `None` when nothing of the rectangle is visible.
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
        if self.is_empty() || !self.x.is_finite() || !self.y.is_finite() {
            return None;
        }
        let fw = frame_width as f64;
        let fh = frame_height as f64;

        let left = (self.x * fw).round().clamp(0.0, fw);
        let top = (self.y * fh).round().clamp(0.0, fh);
        let right = ((self.x + self.width) * fw).round().clamp(0.0, fw);
        let bottom = ((self.y + self.height) * fh).round().clamp(0.0, fh);

        if right <= left || bottom <= top {
            return None;
        }
        Some(PixelRect {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

/// Frames of both camera preview views in one shared coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PreviewLayout {
    pub back: ViewRect,
    pub front: ViewRect,
}

impl PreviewLayout {
    pub fn frame_of(&self, position: DevicePosition) -> ViewRect {
        match position {
            DevicePosition::Back => self.back,
            DevicePosition::Front => self.front,
        }
    }

    /// The inset view's frame relative to the full-screen view, divided by
    /// the full-screen view's size. `None` while the full-screen view has no
    /// area.
    pub fn normalized_inset(&self, pip: PipState) -> Option<NormalizedRect> {
        let full = self.frame_of(pip.full_screen_position());
        let inset = self.frame_of(pip.inset_position());
        if !(full.width > 0.0 && full.height > 0.0) {
            return None;
        }
        Some(NormalizedRect {
            x: (inset.x - full.x) / full.width,
            y: (inset.y - full.y) / full.height,
            width: inset.width / full.width,
            height: inset.height / full.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_front_inset() {
        let pip = PipState::default();
        assert_eq!(pip.inset_position(), DevicePosition::Front);
        assert_eq!(pip.full_screen_position(), DevicePosition::Back);
        assert!(!pip.full_screen_is_secondary());
        assert_eq!(pip.toggled().toggled(), pip);
    }

    #[test]
    fn test_normalized_inset_from_view_frames() {
        let layout = PreviewLayout {
            back: ViewRect::new(0.0, 0.0, 400.0, 800.0),
            front: ViewRect::new(280.0, 40.0, 100.0, 200.0),
        };
        let rect = layout.normalized_inset(PipState::FrontIsInset).unwrap();
        assert_eq!(rect, NormalizedRect::new(0.7, 0.05, 0.25, 0.25));
    }

    #[test]
    fn test_normalized_inset_needs_full_screen_area() {
        let layout = PreviewLayout::default();
        assert!(layout.normalized_inset(PipState::FrontIsInset).is_none());
    }

    #[test]
    fn test_to_pixels_clips() {
        let rect = NormalizedRect::new(0.75, -0.25, 0.5, 0.5);
        let px = rect.to_pixels(100, 200).unwrap();
        assert_eq!(
            px,
            PixelRect {
                x: 75,
                y: 0,
                width: 25,
                height: 50
            }
        );
        assert!(NormalizedRect::new(1.5, 0.0, 0.2, 0.2).to_pixels(100, 100).is_none());
        assert!(NormalizedRect::default().to_pixels(100, 100).is_none());
    }
}
