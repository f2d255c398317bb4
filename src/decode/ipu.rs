//! Inter-pausal unit extraction from decoded label streams.

use serde::{Deserialize, Serialize};

use crate::core::TimeBase;

use super::state_space::State;

/// Default minimum IPU duration in seconds.
pub const MIN_IPU_DURATION_S: f64 = 0.2;

/// A labeled time interval with `end_time > start_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_time: f64,
    pub end_time: f64,
    pub label: String,
}

impl Segment {
    pub fn new(start_time: f64, end_time: f64, label: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            label: label.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Collapse maximal runs of `target_label` into segments, dropping those
/// shorter than `min_duration_s`.
pub fn extract_ipus(
    states: &[State],
    timebase: &TimeBase,
    target_label: State,
    min_duration_s: f64,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut run_start: Option<usize> = None;

    let mut close_run = |start: usize, end: usize, segments: &mut Vec<Segment>| {
        let duration = (end - start) as f64 * timebase.hop_s;
        if duration >= min_duration_s {
            segments.push(Segment::new(
                timebase.frame_to_time(start),
                timebase.frame_to_time(end),
                target_label.as_str(),
            ));
        }
    };

    for (idx, &state) in states.iter().enumerate() {
        if state == target_label {
            if run_start.is_none() {
                run_start = Some(idx);
            }
        } else if let Some(start) = run_start.take() {
            close_run(start, idx, &mut segments);
        }
    }
    if let Some(start) = run_start {
        close_run(start, states.len(), &mut segments);
    }
    segments
}

/// Count IPU starts (A/B/OVL runs) whose previous contiguous segment is LEAK.
pub fn count_ipu_starts_after_leak(states: &[State]) -> usize {
    if states.is_empty() {
        return 0;
    }
    let mut segment_labels = vec![states[0]];
    for &s in &states[1..] {
        if segment_labels.last() != Some(&s) {
            segment_labels.push(s);
        }
    }
    segment_labels
        .windows(2)
        .filter(|pair| pair[0] == State::Leak && pair[1].is_ipu_label())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use State::*;

    fn tb() -> TimeBase {
        TimeBase::canonical()
    }

    #[test]
    fn test_extract_single_run() {
        let states = vec![Sil, A, A, A, Sil];
        let ipus = extract_ipus(&states, &tb(), A, 0.0);
        assert_eq!(ipus.len(), 1);
        assert_eq!(ipus[0].start_time, 0.01);
        assert_eq!(ipus[0].end_time, 0.04);
        assert_eq!(ipus[0].label, "A");
    }

    #[test]
    fn test_min_duration_filter_drops_short_runs() {
        // 20 A frames (0.2 s) pass; 19 (0.19 s) do not
        let mut states = vec![A; 20];
        states.push(Sil);
        assert_eq!(extract_ipus(&states, &tb(), A, MIN_IPU_DURATION_S).len(), 1);

        let mut short = vec![A; 19];
        short.push(Sil);
        assert!(extract_ipus(&short, &tb(), A, MIN_IPU_DURATION_S).is_empty());
    }

    #[test]
    fn test_run_reaching_end_of_stream_is_closed() {
        let states = vec![Sil, B, B, B];
        let ipus = extract_ipus(&states, &tb(), B, 0.0);
        assert_eq!(ipus.len(), 1);
        assert_eq!(ipus[0].end_time, 0.04);
    }

    #[test]
    fn test_multiple_runs() {
        let states = vec![A, A, Sil, A, A, A];
        let ipus = extract_ipus(&states, &tb(), A, 0.0);
        assert_eq!(ipus.len(), 2);
        assert_eq!(ipus[0].duration(), 0.02);
        assert_eq!(ipus[1].duration(), 0.03);
    }

    #[test]
    fn test_labels_extracted_independently() {
        let states = vec![A, Ovl, B, Leak];
        assert_eq!(extract_ipus(&states, &tb(), A, 0.0).len(), 1);
        assert_eq!(extract_ipus(&states, &tb(), B, 0.0).len(), 1);
        assert_eq!(extract_ipus(&states, &tb(), Ovl, 0.0).len(), 1);
        assert_eq!(extract_ipus(&states, &tb(), Leak, 0.0).len(), 1);
    }

    #[test]
    fn test_count_ipu_starts_after_leak() {
        assert_eq!(count_ipu_starts_after_leak(&[]), 0);
        assert_eq!(count_ipu_starts_after_leak(&[Leak, A]), 1);
        assert_eq!(count_ipu_starts_after_leak(&[Leak, Sil, A]), 0);
        assert_eq!(
            count_ipu_starts_after_leak(&[A, Leak, Ovl, Sil, Leak, B]),
            2
        );
        // silence after leak is not an IPU start
        assert_eq!(count_ipu_starts_after_leak(&[A, Leak, Sil]), 0);
    }
}
