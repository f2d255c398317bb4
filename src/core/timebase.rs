//! Canonical global timebase.
//!
//! Every evidence track and every decoded label stream lives on a fixed
//! frame grid. The canonical grid uses a 10 ms hop; producers working on a
//! different hop must resample at the boundary.

use serde::{Deserialize, Serialize};

use super::CoreError;

/// Canonical frame hop in seconds (10 ms).
pub const CANONICAL_HOP_S: f64 = 0.01;

/// Tolerance when comparing hop sizes.
pub const HOP_TOLERANCE: f64 = 1e-12;

/// Immutable frame/time mapping on a fixed hop.
///
/// `n_frames` is optional: a bare `TimeBase` describes only a grid spacing,
/// while one carrying `n_frames` additionally pins the track length and is
/// enforced at `EvidenceTrack` construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
    pub hop_s: f64,
    pub n_frames: Option<usize>,
}

impl TimeBase {
    /// Create a timebase with the given hop, without a pinned length.
    pub fn new(hop_s: f64) -> Result<Self, CoreError> {
        if hop_s <= 0.0 {
            return Err(CoreError::NonPositiveHop(hop_s));
        }
        Ok(Self {
            hop_s,
            n_frames: None,
        })
    }

    /// Create a timebase with the given hop and a pinned frame count.
    pub fn with_frames(hop_s: f64, n_frames: usize) -> Result<Self, CoreError> {
        let mut tb = Self::new(hop_s)?;
        tb.n_frames = Some(n_frames);
        Ok(tb)
    }

    /// The canonical 10 ms timebase.
    pub fn canonical() -> Self {
        Self {
            hop_s: CANONICAL_HOP_S,
            n_frames: None,
        }
    }

    /// The canonical 10 ms timebase with a pinned frame count.
    pub fn canonical_with_frames(n_frames: usize) -> Self {
        Self {
            hop_s: CANONICAL_HOP_S,
            n_frames: Some(n_frames),
        }
    }

    /// Frame hop in milliseconds.
    pub fn hop_ms(&self) -> f64 {
        self.hop_s * 1000.0
    }

    /// True when the hop equals the canonical 10 ms hop within tolerance.
    pub fn is_canonical(&self) -> bool {
        (self.hop_s - CANONICAL_HOP_S).abs() <= HOP_TOLERANCE
    }

    /// True when two timebases share the same hop within tolerance.
    pub fn same_hop(&self, other: &TimeBase) -> bool {
        (self.hop_s - other.hop_s).abs() <= HOP_TOLERANCE
    }

    /// Convert a frame index to time in seconds.
    pub fn frame_to_time(&self, frame_index: usize) -> f64 {
        frame_index as f64 * self.hop_s
    }

    /// Convert a time in seconds to a frame index (floor semantics).
    ///
    /// Negative times clamp to frame 0.
    pub fn time_to_frame(&self, time_s: f64) -> usize {
        if time_s <= 0.0 {
            return 0;
        }
        (time_s / self.hop_s).floor() as usize
    }

    /// Number of frames needed to cover a duration (ceil semantics).
    pub fn num_frames(&self, duration_s: f64) -> usize {
        if duration_s <= 0.0 {
            return 0;
        }
        (duration_s / self.hop_s).ceil() as usize
    }

    /// Frame start times in seconds, length `n_frames`.
    pub fn frame_times(&self, n_frames: usize) -> Vec<f64> {
        (0..n_frames).map(|i| self.frame_to_time(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_hop() {
        let tb = TimeBase::canonical();
        assert_eq!(tb.hop_s, CANONICAL_HOP_S);
        assert!(tb.is_canonical());
        assert_eq!(tb.hop_ms(), 10.0);
    }

    #[test]
    fn test_non_positive_hop_rejected() {
        assert!(TimeBase::new(0.0).is_err());
        assert!(TimeBase::new(-0.01).is_err());
    }

    #[test]
    fn test_frame_time_round_trip() {
        let tb = TimeBase::canonical();
        assert_eq!(tb.frame_to_time(42), 0.42);
        assert_eq!(tb.time_to_frame(0.421), 42);
        assert_eq!(tb.num_frames(3.7), 370);
    }

    #[test]
    fn test_time_to_frame_floor_law() {
        // frame_to_time(time_to_frame(t)) <= t < frame_to_time(time_to_frame(t) + 1)
        let tb = TimeBase::canonical();
        for &t in &[0.0, 0.004999, 0.01, 0.42, 1.2345, 100.0] {
            let i = tb.time_to_frame(t);
            assert!(tb.frame_to_time(i) <= t + 1e-12, "t={}", t);
            assert!(t < tb.frame_to_time(i + 1) + 1e-12, "t={}", t);
        }
    }

    #[test]
    fn test_frame_times() {
        let tb = TimeBase::canonical();
        let times = tb.frame_times(5);
        assert_eq!(times, vec![0.0, 0.01, 0.02, 0.03, 0.04]);
    }

    #[test]
    fn test_same_hop_tolerance() {
        let a = TimeBase::new(0.01).unwrap();
        let b = TimeBase::new(0.01 + 1e-13).unwrap();
        let c = TimeBase::new(0.02).unwrap();
        assert!(a.same_hop(&b));
        assert!(b.is_canonical());
        assert!(!a.same_hop(&c));
    }

    #[test]
    fn test_negative_time_clamps() {
        let tb = TimeBase::canonical();
        assert_eq!(tb.time_to_frame(-1.0), 0);
        assert_eq!(tb.num_frames(-1.0), 0);
    }
}
