//! Deterministic synthetic evidence tracks for tests and synthetic
//! evaluation scenarios.

use crate::core::TimeBase;

use super::{EvidenceError, EvidenceTrack, Semantics, TrackValues};

/// Frames covering `seconds` at the given hop.
pub fn frames_for_seconds(seconds: f64, hop_s: f64) -> usize {
    (seconds / hop_s).round() as usize
}

/// Canonical timebase pinned to `n_frames`.
pub fn make_timebase(n_frames: usize) -> TimeBase {
    TimeBase::canonical_with_frames(n_frames)
}

fn piecewise_constant(
    n_frames: usize,
    regions: &[(usize, usize)],
    on_value: f64,
    off_value: f64,
) -> Vec<f64> {
    let mut values = vec![off_value; n_frames];
    for &(start, end) in regions {
        for v in values.iter_mut().take(end.min(n_frames)).skip(start) {
            *v = on_value;
        }
    }
    values
}

/// Speech-probability track: `p_speech` inside the regions, `p_sil` outside.
pub fn make_vad_track(
    tb: TimeBase,
    speech_regions: &[(usize, usize)],
    p_speech: f64,
    p_sil: f64,
) -> Result<EvidenceTrack, EvidenceError> {
    let n = tb.n_frames.unwrap_or(0);
    let values = piecewise_constant(n, speech_regions, p_speech, p_sil);
    EvidenceTrack::new("vad", tb, TrackValues::from(values), Semantics::Probability)
}

/// Per-speaker activity track under the given name (`diar_a` / `diar_b`).
pub fn make_diar_track(
    tb: TimeBase,
    name: &str,
    regions: &[(usize, usize)],
    p_on: f64,
    p_off: f64,
) -> Result<EvidenceTrack, EvidenceError> {
    let n = tb.n_frames.unwrap_or(0);
    let values = piecewise_constant(n, regions, p_on, p_off);
    EvidenceTrack::new(name, tb, TrackValues::from(values), Semantics::Probability)
}

/// Leakage-probability track.
pub fn make_leak_track(
    tb: TimeBase,
    regions: &[(usize, usize)],
    p_on: f64,
    p_off: f64,
) -> Result<EvidenceTrack, EvidenceError> {
    let n = tb.n_frames.unwrap_or(0);
    let values = piecewise_constant(n, regions, p_on, p_off);
    EvidenceTrack::new(
        "leakage_likelihood",
        tb,
        TrackValues::from(values),
        Semantics::Probability,
    )
}

/// Turn consecutive block lengths into (start, end) regions.
pub fn cumulative_regions(lengths: &[usize]) -> Vec<(usize, usize)> {
    let mut regions = Vec::with_capacity(lengths.len());
    let mut start = 0;
    for &len in lengths {
        regions.push((start, start + len));
        start += len;
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumulative_regions() {
        assert_eq!(
            cumulative_regions(&[4, 3, 4]),
            vec![(0, 4), (4, 7), (7, 11)]
        );
    }

    #[test]
    fn test_make_vad_track_values() {
        let tb = make_timebase(10);
        let track = make_vad_track(tb, &[(2, 5)], 0.95, 0.05).unwrap();
        let v = track.as_vector().unwrap();
        assert_eq!(v[0], 0.05);
        assert_eq!(v[2], 0.95);
        assert_eq!(v[4], 0.95);
        assert_eq!(v[5], 0.05);
    }

    #[test]
    fn test_regions_clamp_to_track_length() {
        let tb = make_timebase(4);
        let track = make_leak_track(tb, &[(2, 100)], 0.7, 0.05).unwrap();
        assert_eq!(track.num_frames(), 4);
        assert_eq!(track.as_vector().unwrap()[3], 0.7);
    }

    #[test]
    fn test_frames_for_seconds() {
        assert_eq!(frames_for_seconds(1.0, 0.01), 100);
        assert_eq!(frames_for_seconds(0.105, 0.01), 11);
    }
}
