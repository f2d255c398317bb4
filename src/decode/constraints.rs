//! Transition penalties and minimum-duration state expansion.
//!
//! All penalties are log-domain additive and non-positive. Two edges are
//! hard-forbidden with negative infinity: silence can never enter leak, and
//! leak can never hand off directly to a speaker (an IPU must not begin out
//! of bleed-through).

use ndarray::Array2;

use super::params::DecodeTuningParams;
use super::state_space::{State, NUM_STATES};

// ---------- Default penalties (log-domain additive) ----------

pub const STAY_REWARD: f64 = 0.0;
pub const GENERIC_SWITCH_PENALTY: f64 = -3.0;
pub const SPEAKER_SWITCH_PENALTY: f64 = -6.0;
pub const SIL_EXIT_PENALTY: f64 = -1.0;
pub const SIL_ENTER_PENALTY: f64 = -0.5;
pub const LEAK_ENTER_PENALTY: f64 = -2.0;
pub const LEAK_EXIT_TO_SIL_PENALTY: f64 = -0.5;
pub const LEAK_TO_OVL_PENALTY: f64 = -5.0;
pub const LEAK_FORBID: f64 = f64::NEG_INFINITY;

// ---------- Default minimum durations (frames) ----------

pub const MIN_IPU_FRAMES: usize = 3;
pub const MIN_SIL_FRAMES: usize = 2;

/// Minimum run length per base state, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinDurations {
    pub sil: usize,
    pub a: usize,
    pub b: usize,
    pub ovl: usize,
    pub leak: usize,
}

impl Default for MinDurations {
    fn default() -> Self {
        Self {
            sil: MIN_SIL_FRAMES,
            a: MIN_IPU_FRAMES,
            b: MIN_IPU_FRAMES,
            ovl: MIN_IPU_FRAMES,
            leak: MIN_IPU_FRAMES,
        }
    }
}

impl MinDurations {
    /// Duration for one state, clamped to at least one frame.
    pub fn get(&self, state: State) -> usize {
        let d = match state {
            State::Sil => self.sil,
            State::A => self.a,
            State::B => self.b,
            State::Ovl => self.ovl,
            State::Leak => self.leak,
        };
        d.max(1)
    }

    /// Total size of the expanded state space.
    pub fn expanded_size(&self) -> usize {
        State::ALL.iter().map(|&s| self.get(s)).sum()
    }
}

/// Build the base 5x5 transition log-penalty matrix.
///
/// Construction order matters: the silence exit/enter adjustments apply on
/// top of the edge costs set before them, then the SIL self-loop and the
/// hard forbids are re-asserted.
pub fn base_transition_matrix(params: &DecodeTuningParams) -> Array2<f64> {
    let mut mat = Array2::from_elem((NUM_STATES, NUM_STATES), GENERIC_SWITCH_PENALTY);
    for i in 0..NUM_STATES {
        mat[[i, i]] = STAY_REWARD;
    }

    let sil = State::Sil.index();
    let a = State::A.index();
    let b = State::B.index();
    let ovl = State::Ovl.index();
    let leak = State::Leak.index();

    mat[[a, b]] = params.speaker_switch_penalty;
    mat[[b, a]] = params.speaker_switch_penalty;

    mat[[sil, leak]] = LEAK_FORBID;

    let (a_to_ovl, b_to_ovl, ovl_to_a, ovl_to_b) = params.resolved_ovl_costs();
    mat[[a, ovl]] = a_to_ovl;
    mat[[b, ovl]] = b_to_ovl;
    mat[[ovl, a]] = ovl_to_a;
    mat[[ovl, b]] = ovl_to_b;
    mat[[sil, ovl]] = params.ovl_transition_cost;
    mat[[ovl, sil]] = params.ovl_transition_cost;

    // Leak is silence-adjacent and never initiates speaker IPUs.
    for src in [a, b, ovl] {
        mat[[src, leak]] = params.leak_entry_bias;
    }
    mat[[leak, sil]] = LEAK_EXIT_TO_SIL_PENALTY;
    mat[[leak, a]] = LEAK_FORBID;
    mat[[leak, b]] = LEAK_FORBID;
    mat[[leak, ovl]] = LEAK_TO_OVL_PENALTY;

    for j in 0..NUM_STATES {
        mat[[sil, j]] += SIL_EXIT_PENALTY;
    }
    for i in 0..NUM_STATES {
        mat[[i, sil]] += SIL_ENTER_PENALTY;
    }
    mat[[sil, sil]] = STAY_REWARD;
    mat[[sil, leak]] = LEAK_FORBID;
    mat[[leak, a]] = LEAK_FORBID;
    mat[[leak, b]] = LEAK_FORBID;

    mat
}

/// The duration-expanded state space.
///
/// Each base state with minimum duration `d` becomes a chain of `d`
/// sub-states. Within a chain the only edge is `sub_k -> sub_{k+1}` at cost
/// zero; from the final sub-state, edges enter the first sub-state of any
/// base at the base transition cost, and the self-loop at the final
/// sub-state costs zero so runs may exceed the minimum.
#[derive(Debug, Clone)]
pub struct ExpandedSpace {
    /// (base state, position in its chain) per expanded index.
    pub states: Vec<(State, usize)>,
    /// Expanded transition matrix, shape (S_exp, S_exp).
    pub transition: Array2<f64>,
    /// Base state per expanded index.
    pub collapse: Vec<State>,
    /// Expanded index of the first sub-state of each base state.
    pub first_index: [usize; NUM_STATES],
}

impl ExpandedSpace {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Expand base states into duration-enforcing sub-state chains.
pub fn expand_state_space(
    min_durations: &MinDurations,
    base_transition: &Array2<f64>,
) -> ExpandedSpace {
    let mut states: Vec<(State, usize)> = Vec::with_capacity(min_durations.expanded_size());
    let mut first_index = [0usize; NUM_STATES];
    for state in State::ALL {
        first_index[state.index()] = states.len();
        for k in 0..min_durations.get(state) {
            states.push((state, k));
        }
    }

    let s_exp = states.len();
    let mut transition = Array2::from_elem((s_exp, s_exp), f64::NEG_INFINITY);

    for (i, &(src_base, src_sub)) in states.iter().enumerate() {
        let d_src = min_durations.get(src_base);
        if src_sub < d_src - 1 {
            // must stay within the duration chain
            transition[[i, i + 1]] = STAY_REWARD;
            continue;
        }

        // final sub-state: enter the first sub-state of any base
        for (j, &(dst_base, dst_sub)) in states.iter().enumerate() {
            if dst_sub != 0 {
                continue;
            }
            transition[[i, j]] = base_transition[[src_base.index(), dst_base.index()]];
        }
        // staying in the same base once the duration is satisfied
        transition[[i, i]] = STAY_REWARD;
    }

    let collapse = states.iter().map(|&(base, _)| base).collect();
    ExpandedSpace {
        states,
        transition,
        collapse,
        first_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_matrix() -> Array2<f64> {
        base_transition_matrix(&DecodeTuningParams::default())
    }

    #[test]
    fn test_diagonal_is_stay_reward() {
        let mat = default_matrix();
        for i in 0..NUM_STATES {
            assert_eq!(mat[[i, i]], STAY_REWARD);
        }
    }

    #[test]
    fn test_hard_forbidden_edges() {
        let mat = default_matrix();
        let (sil, a, b, leak) = (
            State::Sil.index(),
            State::A.index(),
            State::B.index(),
            State::Leak.index(),
        );
        assert_eq!(mat[[sil, leak]], f64::NEG_INFINITY);
        assert_eq!(mat[[leak, a]], f64::NEG_INFINITY);
        assert_eq!(mat[[leak, b]], f64::NEG_INFINITY);
    }

    #[test]
    fn test_silence_adjustments_compose() {
        let mat = default_matrix();
        let (sil, a, ovl, leak) = (
            State::Sil.index(),
            State::A.index(),
            State::Ovl.index(),
            State::Leak.index(),
        );
        // exiting silence: generic -3 plus exit penalty -1
        assert_eq!(mat[[sil, a]], -4.0);
        // entering silence: generic -3 plus enter penalty -0.5
        assert_eq!(mat[[a, sil]], -3.5);
        assert_eq!(mat[[ovl, sil]], -3.5);
        // leak exits to silence cheaply, plus the enter adjustment
        assert_eq!(mat[[leak, sil]], -1.0);
    }

    #[test]
    fn test_speaker_switch_and_leak_edges() {
        let mat = default_matrix();
        let (a, b, ovl, leak) = (
            State::A.index(),
            State::B.index(),
            State::Ovl.index(),
            State::Leak.index(),
        );
        assert_eq!(mat[[a, b]], -6.0);
        assert_eq!(mat[[b, a]], -6.0);
        assert_eq!(mat[[a, leak]], -2.0);
        assert_eq!(mat[[ovl, leak]], -2.0);
        assert_eq!(mat[[leak, ovl]], -5.0);
    }

    #[test]
    fn test_all_entries_non_positive() {
        let mat = default_matrix();
        assert!(mat.iter().all(|&v| v <= 0.0));
    }

    #[test]
    fn test_tuning_params_flow_through() {
        let params = DecodeTuningParams::new(-9.0, -1.5, -2.5);
        let mat = base_transition_matrix(&params);
        assert_eq!(mat[[State::A.index(), State::B.index()]], -9.0);
        assert_eq!(mat[[State::A.index(), State::Leak.index()]], -1.5);
        assert_eq!(mat[[State::A.index(), State::Ovl.index()]], -2.5);
    }

    #[test]
    fn test_expanded_size_and_collapse() {
        let durs = MinDurations::default();
        let space = expand_state_space(&durs, &default_matrix());
        assert_eq!(space.len(), 2 + 3 + 3 + 3 + 3);
        assert_eq!(space.collapse[0], State::Sil);
        assert_eq!(space.collapse[1], State::Sil);
        assert_eq!(space.collapse[2], State::A);
        assert_eq!(space.first_index[State::A.index()], 2);
    }

    #[test]
    fn test_chain_transitions() {
        let durs = MinDurations::default();
        let base = default_matrix();
        let space = expand_state_space(&durs, &base);

        // Inside a chain only the next sub-state is reachable.
        let a0 = space.first_index[State::A.index()];
        assert_eq!(space.transition[[a0, a0 + 1]], 0.0);
        assert_eq!(space.transition[[a0, a0]], f64::NEG_INFINITY);
        for j in 0..space.len() {
            if j != a0 + 1 {
                assert_eq!(space.transition[[a0, j]], f64::NEG_INFINITY);
            }
        }

        // Final sub-state self-loops at zero and exits at base cost.
        let a_last = a0 + durs.a - 1;
        assert_eq!(space.transition[[a_last, a_last]], 0.0);
        let b0 = space.first_index[State::B.index()];
        assert_eq!(
            space.transition[[a_last, b0]],
            base[[State::A.index(), State::B.index()]]
        );
        // Non-first sub-states are never entered from another chain.
        assert_eq!(space.transition[[a_last, b0 + 1]], f64::NEG_INFINITY);
    }

    #[test]
    fn test_min_duration_one_allows_immediate_exit() {
        let durs = MinDurations {
            sil: 1,
            a: 1,
            b: 1,
            ovl: 1,
            leak: 1,
        };
        let base = default_matrix();
        let space = expand_state_space(&durs, &base);
        assert_eq!(space.len(), NUM_STATES);
        // with d=1 the expanded matrix equals the base matrix
        for i in 0..NUM_STATES {
            for j in 0..NUM_STATES {
                assert_eq!(space.transition[[i, j]], base[[i, j]]);
            }
        }
    }
}
