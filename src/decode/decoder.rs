//! Constrained Viterbi decoding over the expanded state space.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::constraints::{self, ExpandedSpace, MinDurations};
use super::params::DecodeTuningParams;
use super::state_space::{State, NUM_STATES};
use super::DecodeError;

/// Run a standard Viterbi dynamic program in log space.
///
/// `scores` is (T, S) emission log-scores, `transition` (S, S) with source
/// states on rows, `initial` the per-state starting log-score (zeros when
/// absent). Ties in the argmax resolve to the lowest state index; this is a
/// hard contract so decoded paths are identical across machines.
pub fn viterbi_decode(
    scores: &Array2<f64>,
    transition: &Array2<f64>,
    initial: Option<&Array1<f64>>,
) -> Result<(Vec<usize>, f64), DecodeError> {
    let (t_len, s_len) = scores.dim();
    if t_len == 0 {
        return Err(DecodeError::EmptyScores);
    }
    if transition.dim() != (s_len, s_len) {
        let (rows, cols) = transition.dim();
        return Err(DecodeError::BadTransitionShape {
            expected: s_len,
            rows,
            cols,
        });
    }
    if let Some(init) = initial {
        if init.len() != s_len {
            return Err(DecodeError::BadInitialShape {
                expected: s_len,
                got: init.len(),
            });
        }
    }
    if scores.iter().any(|v| v.is_nan()) {
        return Err(DecodeError::NanScores);
    }

    let mut dp = Array2::zeros((t_len, s_len));
    let mut bp = Array2::from_elem((t_len, s_len), 0usize);

    for s in 0..s_len {
        let init = initial.map_or(0.0, |i| i[s]);
        dp[[0, s]] = init + scores[[0, s]];
    }

    for t in 1..t_len {
        for s in 0..s_len {
            let mut best_prev = 0usize;
            let mut best_score = f64::NEG_INFINITY;
            for prev in 0..s_len {
                let candidate = dp[[t - 1, prev]] + transition[[prev, s]];
                // strict '>' keeps the lowest index on ties
                if candidate > best_score {
                    best_score = candidate;
                    best_prev = prev;
                }
            }
            dp[[t, s]] = best_score + scores[[t, s]];
            bp[[t, s]] = best_prev;
        }
    }

    let mut last_state = 0usize;
    let mut path_score = f64::NEG_INFINITY;
    for s in 0..s_len {
        if dp[[t_len - 1, s]] > path_score {
            path_score = dp[[t_len - 1, s]];
            last_state = s;
        }
    }

    let mut path = vec![0usize; t_len];
    path[t_len - 1] = last_state;
    for t in (1..t_len).rev() {
        path[t - 1] = bp[[t, path[t]]];
    }
    Ok((path, path_score))
}

/// Copy base-state scores onto every sub-state of the expanded space.
pub fn expand_scores(base_scores: &Array2<f64>, space: &ExpandedSpace) -> Array2<f64> {
    let t_len = base_scores.nrows();
    let mut expanded = Array2::zeros((t_len, space.len()));
    for (j, &(base, _)) in space.states.iter().enumerate() {
        for t in 0..t_len {
            expanded[[t, j]] = base_scores[[t, base.index()]];
        }
    }
    expanded
}

/// Options for constrained decoding.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    pub min_durations: MinDurations,
    pub tuning: DecodeTuningParams,
    /// Base transition override; built from `tuning` when absent.
    pub transition: Option<Array2<f64>>,
    /// Base initial log-scores; the default forbids LEAK at sequence start.
    pub initial: Option<Array1<f64>>,
}

/// Decode a base-state path respecting transition penalties and minimum
/// durations.
///
/// `log_scores` has shape (T, 5) on the base states. The default initial
/// distribution gives every state a zero log-score except LEAK, which is
/// negative infinity: bleed-through cannot initiate a sequence.
pub fn decode_with_constraints(
    log_scores: &Array2<f64>,
    options: &DecodeOptions,
) -> Result<Vec<State>, DecodeError> {
    if log_scores.ncols() != NUM_STATES {
        return Err(DecodeError::BadScoreWidth {
            expected: NUM_STATES,
            got: log_scores.ncols(),
        });
    }

    let base_transition = match &options.transition {
        Some(t) => {
            if t.dim() != (NUM_STATES, NUM_STATES) {
                let (rows, cols) = t.dim();
                return Err(DecodeError::BadTransitionShape {
                    expected: NUM_STATES,
                    rows,
                    cols,
                });
            }
            t.clone()
        }
        None => constraints::base_transition_matrix(&options.tuning),
    };
    let space = constraints::expand_state_space(&options.min_durations, &base_transition);
    let expanded_scores = expand_scores(log_scores, &space);

    let init_base = match &options.initial {
        Some(init) => {
            if init.len() != NUM_STATES {
                return Err(DecodeError::BadInitialShape {
                    expected: NUM_STATES,
                    got: init.len(),
                });
            }
            init.clone()
        }
        None => {
            let mut init = Array1::zeros(NUM_STATES);
            init[State::Leak.index()] = f64::NEG_INFINITY;
            init
        }
    };

    // map base initial onto the first sub-state of each chain
    let mut init_expanded = Array1::from_elem(space.len(), f64::NEG_INFINITY);
    for (idx, &(base, sub)) in space.states.iter().enumerate() {
        if sub == 0 {
            init_expanded[idx] = init_base[base.index()];
        }
    }

    let (path_idx, _) = viterbi_decode(&expanded_scores, &space.transition, Some(&init_expanded))?;
    Ok(path_idx.into_iter().map(|i| space.collapse[i]).collect())
}

/// Deterministic counters over a decoded path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeDiagnostics {
    /// IPU starts whose previous contiguous segment was LEAK.
    pub ipu_start_after_leak_count: usize,
}

/// Compute diagnostics from a decoded base-state sequence.
pub fn decode_diagnostics(states: &[State]) -> DecodeDiagnostics {
    DecodeDiagnostics {
        ipu_start_after_leak_count: super::ipu::count_ipu_starts_after_leak(states),
    }
}

// ---------- Deterministic evidence helpers ----------

/// Scores where each block favors one state by `margin`.
pub fn scripted_block_scores(blocks: &[(State, usize)], margin: f64) -> Array2<f64> {
    let total: usize = blocks.iter().map(|&(_, len)| len).sum();
    let mut scores = Array2::zeros((total, NUM_STATES));
    let mut t = 0;
    for &(state, len) in blocks {
        for _ in 0..len {
            scores[[t, state.index()]] += margin;
            t += 1;
        }
    }
    scores
}

/// Seeded uniform scores in [-1, 1) for tests.
pub fn random_scores(t_len: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((t_len, NUM_STATES), |_| rng.gen::<f64>() * 2.0 - 1.0)
}
