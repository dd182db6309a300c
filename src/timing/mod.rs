//! Rational media time for presentation timestamps and frame durations
//!
//! Timestamps are `value / timescale` seconds. Frame durations are expressed
//! the same way, so a 30 fps minimum frame duration is `1/30`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Timescale used when two times with different timescales are combined.
pub const NANOSECOND_TIMESCALE: i32 = 1_000_000_000;

/// A rational point in (or span of) media time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: i32,
}

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime {
        value: 0,
        timescale: 1,
    };

    /// Create a media time. A non-positive timescale is clamped to 1.
    pub fn new(value: i64, timescale: i32) -> Self {
        Self {
            value,
            timescale: timescale.max(1),
        }
    }

    pub fn from_seconds(seconds: f64, timescale: i32) -> Self {
        let timescale = timescale.max(1);
        Self {
            value: (seconds * timescale as f64).round() as i64,
            timescale,
        }
    }

    /// Duration of one frame at `fps`, i.e. `1/fps`.
    ///
    /// Fractional rates are truncated to whole frames per second, matching
    /// how device frame-duration overrides are expressed.
    pub fn frame_duration(fps: f64) -> Self {
        Self::new(1, fps.max(1.0) as i32)
    }

    pub fn seconds(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Frame rate implied by treating this time as a frame duration.
    pub fn as_frame_rate(&self) -> f64 {
        if self.value <= 0 {
            return 0.0;
        }
        self.timescale as f64 / self.value as f64
    }

    /// Express this time in another timescale (rounding toward zero).
    pub fn convert_scale(&self, timescale: i32) -> Self {
        let timescale = timescale.max(1);
        let value = (self.value as i128 * timescale as i128) / self.timescale as i128;
        Self {
            value: value as i64,
            timescale,
        }
    }

    /// `self - earlier`, in the shared timescale when both agree and in
    /// nanoseconds otherwise.
    pub fn saturating_sub(&self, earlier: MediaTime) -> MediaTime {
        if self.timescale == earlier.timescale {
            return MediaTime::new(self.value.saturating_sub(earlier.value), self.timescale);
        }
        let a = self.convert_scale(NANOSECOND_TIMESCALE);
        let b = earlier.convert_scale(NANOSECOND_TIMESCALE);
        MediaTime::new(a.value.saturating_sub(b.value), NANOSECOND_TIMESCALE)
    }

    fn cross(&self, other: &MediaTime) -> (i128, i128) {
        (
            self.value as i128 * other.timescale as i128,
            other.value as i128 * self.timescale as i128,
        )
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = self.cross(other);
        a == b
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = self.cross(other);
        a.cmp(&b)
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({:.4}s)", self.value, self.timescale, self.seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration_round_trips_rate() {
        let d = MediaTime::frame_duration(30.0);
        assert_eq!(d, MediaTime::new(1, 30));
        assert_eq!(d.as_frame_rate(), 30.0);
    }

    #[test]
    fn test_ordering_across_timescales() {
        let a = MediaTime::new(1, 2);
        let b = MediaTime::new(600, 1000);
        assert!(a < b);
        assert_eq!(MediaTime::new(3, 6), MediaTime::new(1, 2));
    }

    #[test]
    fn test_saturating_sub_mixed_scales() {
        let later = MediaTime::new(3, 2);
        let earlier = MediaTime::new(250, 1000);
        let delta = later.saturating_sub(earlier);
        assert!((delta.seconds() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_timescale_clamped() {
        let t = MediaTime::new(5, 0);
        assert_eq!(t.timescale, 1);
        assert_eq!(t.seconds(), 5.0);
    }
}
