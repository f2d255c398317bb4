//! Label-stream comparison metrics.

use crate::decode::{Segment, State};

/// IPUs shorter than this count as micro-IPUs.
pub const MICRO_IPU_MAX_DURATION_S: f64 = 0.2;

/// Boundary-matching outcome at one tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

/// Greedy boundary matching at tolerance `tol_s`.
///
/// Hypothesis boundaries are visited in order; each matches the closest
/// still-unmatched reference boundary within tolerance, ties resolving to
/// the lowest reference index. Two empty boundary sets agree perfectly and
/// score F1 = 1 by convention.
pub fn boundary_f1(ref_boundaries_s: &[f64], hyp_boundaries_s: &[f64], tol_s: f64) -> BoundaryScore {
    if ref_boundaries_s.is_empty() && hyp_boundaries_s.is_empty() {
        return BoundaryScore {
            precision: 1.0,
            recall: 1.0,
            f1: 1.0,
            true_positives: 0,
            false_positives: 0,
            false_negatives: 0,
        };
    }

    let mut reference = ref_boundaries_s.to_vec();
    let mut hypothesis = hyp_boundaries_s.to_vec();
    reference.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    hypothesis.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut ref_used = vec![false; reference.len()];
    let mut tp = 0usize;
    for &h in &hypothesis {
        let mut best: Option<(usize, f64)> = None;
        for (i, &r) in reference.iter().enumerate() {
            if ref_used[i] {
                continue;
            }
            let dist = (r - h).abs();
            if dist > tol_s {
                continue;
            }
            // strict '<' keeps the lowest index on equal distance
            if best.map_or(true, |(_, best_dist)| dist < best_dist) {
                best = Some((i, dist));
            }
        }
        if let Some((i, _)) = best {
            ref_used[i] = true;
            tp += 1;
        }
    }

    let fp = hypothesis.len() - tp;
    let fn_count = reference.len() - tp;
    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fn_count > 0 {
        tp as f64 / (tp + fn_count) as f64
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    BoundaryScore {
        precision,
        recall,
        f1,
        true_positives: tp,
        false_positives: fp,
        false_negatives: fn_count,
    }
}

/// Intersection-over-union of two boolean masks.
///
/// Both-empty masks score 1.0 (perfect agreement on absence).
pub fn framewise_iou(ref_mask: &[bool], hyp_mask: &[bool]) -> f64 {
    let mut intersection = 0usize;
    let mut union = 0usize;
    for (&r, &h) in ref_mask.iter().zip(hyp_mask.iter()) {
        if r && h {
            intersection += 1;
        }
        if r || h {
            union += 1;
        }
    }
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

/// Mask of frames whose state is in `labels`.
pub fn mask_for(states: &[State], labels: &[State]) -> Vec<bool> {
    states.iter().map(|s| labels.contains(s)).collect()
}

/// Micro-IPUs (shorter than 0.2 s) per minute of audio.
pub fn micro_ipus_per_min(ipus: &[Segment], total_duration_s: f64) -> f64 {
    if total_duration_s <= 0.0 {
        return 0.0;
    }
    let count = ipus
        .iter()
        .filter(|seg| seg.duration() < MICRO_IPU_MAX_DURATION_S)
        .count();
    count as f64 / (total_duration_s / 60.0)
}

/// A<->B transitions per minute, ignoring everything that is not a plain
/// speaker label (interruptions by SIL/OVL/LEAK do not reset the pairing).
pub fn speaker_switches_per_min(states: &[State], hop_s: f64) -> f64 {
    let mut last: Option<State> = None;
    let mut switches = 0usize;
    for &s in states {
        if !s.is_speaker() {
            continue;
        }
        match last {
            None => last = Some(s),
            Some(prev) if prev != s => {
                switches += 1;
                last = Some(s);
            }
            Some(_) => {}
        }
    }
    let total_duration_s = states.len() as f64 * hop_s;
    if total_duration_s <= 0.0 {
        return 0.0;
    }
    switches as f64 / (total_duration_s / 60.0)
}

/// Count of A-B-A / B-A-B frame triples.
pub fn rapid_alternations(states: &[State]) -> usize {
    states
        .windows(3)
        .filter(|w| {
            w[0].is_speaker()
                && w[1].is_speaker()
                && w[2].is_speaker()
                && w[0] != w[1]
                && w[0] == w[2]
        })
        .count()
}

/// Boundary times (seconds) at every state change.
pub fn state_boundaries(states: &[State], hop_s: f64) -> Vec<f64> {
    let mut boundaries = Vec::new();
    for (i, pair) in states.windows(2).enumerate() {
        if pair[0] != pair[1] {
            boundaries.push((i + 1) as f64 * hop_s);
        }
    }
    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use State::*;

    #[test]
    fn test_boundary_f1_greedy_match() {
        // ref [0.1, 0.5], hyp [0.11, 0.7], tolerance 0.05
        let score = boundary_f1(&[0.1, 0.5], &[0.11, 0.7], 0.05);
        assert_eq!(score.true_positives, 1);
        assert_eq!(score.false_positives, 1);
        assert_eq!(score.false_negatives, 1);
        assert!((score.precision - 0.5).abs() < 1e-12);
        assert!((score.recall - 0.5).abs() < 1e-12);
        assert!((score.f1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_f1_identical_inputs() {
        let boundaries = [0.2, 0.4, 0.9];
        let score = boundary_f1(&boundaries, &boundaries, 0.02);
        assert_eq!(score.f1, 1.0);
        assert_eq!(score.false_positives, 0);
        assert_eq!(score.false_negatives, 0);
    }

    #[test]
    fn test_boundary_f1_both_empty_is_perfect() {
        let score = boundary_f1(&[], &[], 0.02);
        assert_eq!(score.f1, 1.0);
        assert_eq!(score.precision, 1.0);
        assert_eq!(score.recall, 1.0);
        assert_eq!(score.true_positives, 0);
        assert_eq!(score.false_positives, 0);
        assert_eq!(score.false_negatives, 0);
    }

    #[test]
    fn test_boundary_f1_one_side_empty_scores_zero() {
        let score = boundary_f1(&[0.5], &[], 0.02);
        assert_eq!(score.f1, 0.0);
        assert_eq!(score.false_negatives, 1);

        let score = boundary_f1(&[], &[0.5], 0.02);
        assert_eq!(score.f1, 0.0);
        assert_eq!(score.false_positives, 1);
    }

    #[test]
    fn test_boundary_f1_each_ref_matched_once() {
        // two hypotheses near one reference: only one can match
        let score = boundary_f1(&[0.5], &[0.49, 0.51], 0.05);
        assert_eq!(score.true_positives, 1);
        assert_eq!(score.false_positives, 1);
    }

    #[test]
    fn test_boundary_f1_tie_takes_lowest_index() {
        // hypothesis exactly between two references
        let score = boundary_f1(&[0.4, 0.6], &[0.5], 0.2);
        assert_eq!(score.true_positives, 1);
        // the first reference is consumed, the second is missed
        assert_eq!(score.false_negatives, 1);
    }

    #[test]
    fn test_iou_conventions() {
        assert_eq!(framewise_iou(&[], &[]), 1.0);
        assert_eq!(framewise_iou(&[false, false], &[false, false]), 1.0);
        assert_eq!(framewise_iou(&[true, false], &[false, false]), 0.0);
        assert_eq!(framewise_iou(&[true, true], &[true, false]), 0.5);
        assert_eq!(framewise_iou(&[true], &[true]), 1.0);
    }

    #[test]
    fn test_micro_ipus_per_min() {
        let ipus = vec![
            Segment::new(0.0, 0.1, "A"),  // micro
            Segment::new(1.0, 1.5, "A"),  // fine
            Segment::new(2.0, 2.19, "B"), // micro
        ];
        // 60 seconds of audio -> 2 micro IPUs per minute
        assert!((micro_ipus_per_min(&ipus, 60.0) - 2.0).abs() < 1e-12);
        assert_eq!(micro_ipus_per_min(&ipus, 0.0), 0.0);
    }

    #[test]
    fn test_speaker_switches_ignore_interruptions() {
        // A ... B counts once even with SIL/OVL in between
        let states = vec![A, A, Sil, Ovl, B, B, Sil, A];
        // 8 frames at 10ms = 0.08s; 2 switches (A->B, B->A)
        let per_min = speaker_switches_per_min(&states, 0.01);
        let expected = 2.0 / (0.08 / 60.0);
        assert!((per_min - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rapid_alternations_triple_patterns() {
        assert_eq!(rapid_alternations(&[A, B, A]), 1);
        assert_eq!(rapid_alternations(&[B, A, B, A]), 2);
        assert_eq!(rapid_alternations(&[A, A, A]), 0);
        assert_eq!(rapid_alternations(&[A, Sil, A]), 0);
        assert_eq!(rapid_alternations(&[A, B, B]), 0);
    }

    #[test]
    fn test_state_boundaries() {
        let states = vec![Sil, Sil, A, A, B];
        assert_eq!(state_boundaries(&states, 0.01), vec![0.02, 0.04]);
        assert!(state_boundaries(&[Sil], 0.01).is_empty());
    }
}
