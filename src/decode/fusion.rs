//! Evidence fusion: bundle tracks to per-state log-scores.

use ndarray::{Array1, Array2};

use crate::evidence::leakage::LEAKAGE_TRACK_NAME;
use crate::evidence::{EvidenceBundle, EvidenceError, EvidenceTrack, Semantics, TrackValues};

use super::state_space::{State, NUM_STATES};

// ---------- Fusion weights ----------

pub const LOG_EPS: f64 = 1e-6;
pub const W_SPEECH: f64 = 1.0;
pub const W_DIAR: f64 = 1.0;
pub const W_OVL: f64 = 1.5;
pub const W_LEAK: f64 = 1.0;
pub const W_LEAK_SIL_BIAS: f64 = 0.5;
pub const LEAK_BASELINE_PENALTY: f64 = -3.0;
pub const W_PRIOR: f64 = 0.4;
pub const OVL_BONUS: f64 = 0.4;

/// A/B prior offsets: constant or per-frame.
enum PriorOffsets {
    Constant(f64, f64),
    PerFrame(Array2<f64>),
}

impl PriorOffsets {
    fn at(&self, t: usize) -> (f64, f64) {
        match self {
            PriorOffsets::Constant(a, b) => (*a, *b),
            PriorOffsets::PerFrame(m) => (m[[t, 0]], m[[t, 1]]),
        }
    }
}

/// Probabilities from a probability/logit track; `score` tracks are illegal
/// in probability roles.
fn prob_values(track: &EvidenceTrack) -> Result<Array1<f64>, EvidenceError> {
    let values = match track.values() {
        TrackValues::Vector(v) => v.clone(),
        TrackValues::Matrix(_) => {
            return Err(EvidenceError::WrongSemantics {
                name: track.name().to_string(),
                expected: "a 1-D probability or logit".to_string(),
                got: "a matrix".to_string(),
            })
        }
    };
    match track.semantics() {
        Semantics::Probability => Ok(values),
        Semantics::Logit => Ok(values.mapv(|x| 1.0 / (1.0 + (-x).exp()))),
        Semantics::Score => Err(EvidenceError::WrongSemantics {
            name: track.name().to_string(),
            expected: "probability or logit".to_string(),
            got: "score".to_string(),
        }),
    }
}

fn log_prob(p: &Array1<f64>) -> Array1<f64> {
    p.mapv(|x| x.clamp(LOG_EPS, 1.0 - LOG_EPS).ln())
}

fn log_not_prob(p: &Array1<f64>) -> Array1<f64> {
    p.mapv(|x| (1.0 - x).clamp(LOG_EPS, 1.0 - LOG_EPS).ln())
}

/// Check hop/length consistency and return the shared frame count.
fn check_bundle(bundle: &EvidenceBundle) -> Result<usize, EvidenceError> {
    let tb = bundle.timebase();
    if !tb.is_canonical() {
        return Err(EvidenceError::NotCanonical {
            expected: crate::core::CANONICAL_HOP_S,
            got: tb.hop_s,
        });
    }
    let mut n_frames = tb.n_frames;
    for (name, track) in bundle.iter() {
        if !track.timebase().same_hop(tb) {
            return Err(EvidenceError::HopMismatch {
                name: name.to_string(),
                track_hop: track.timebase().hop_s,
                bundle_hop: tb.hop_s,
            });
        }
        // prior_ab may be a constant (2,) offset; it never pins T and its
        // per-frame variant is length-checked in prior_offsets
        if name == "prior_ab" {
            continue;
        }
        match n_frames {
            None => n_frames = Some(track.num_frames()),
            Some(expected) => {
                if track.num_frames() != expected {
                    return Err(EvidenceError::LengthMismatch {
                        name: name.to_string(),
                        got: track.num_frames(),
                        expected,
                    });
                }
            }
        }
    }
    n_frames.ok_or(EvidenceError::EmptyBundle)
}

fn prior_offsets(track: &EvidenceTrack, n_frames: usize) -> Result<PriorOffsets, EvidenceError> {
    if track.semantics() != Semantics::Score {
        return Err(EvidenceError::WrongSemantics {
            name: track.name().to_string(),
            expected: "score (additive log offset)".to_string(),
            got: track.semantics().as_str().to_string(),
        });
    }
    match track.values() {
        TrackValues::Vector(v) => match v.len() {
            1 => Ok(PriorOffsets::Constant(v[0], v[0])),
            2 => Ok(PriorOffsets::Constant(v[0], v[1])),
            _ => Err(EvidenceError::BadPriorShape),
        },
        TrackValues::Matrix(m) => {
            if m.ncols() != 2 {
                return Err(EvidenceError::BadPriorShape);
            }
            if m.nrows() != n_frames {
                return Err(EvidenceError::LengthMismatch {
                    name: track.name().to_string(),
                    got: m.nrows(),
                    expected: n_frames,
                });
            }
            Ok(PriorOffsets::PerFrame(m.clone()))
        }
    }
}

/// Fuse an `EvidenceBundle` into per-state log-scores of shape (T, 5).
///
/// Missing tracks degrade to neutral defaults: 0.5 for speech and speaker
/// probabilities, a zero log-likelihood for leak (its baseline penalty keeps
/// the state disfavored without evidence).
pub fn fuse_bundle_to_scores(bundle: &EvidenceBundle) -> Result<Array2<f64>, EvidenceError> {
    let n_frames = check_bundle(bundle)?;

    let half = Array1::from_elem(n_frames, 0.5);
    let p_speech = match bundle.get("vad") {
        Some(track) => prob_values(track)?,
        None => half.clone(),
    };
    let p_a = match bundle.get("diar_a") {
        Some(track) => prob_values(track)?,
        None => half.clone(),
    };
    let p_b = match bundle.get("diar_b") {
        Some(track) => prob_values(track)?,
        None => half,
    };

    let log_speech = log_prob(&p_speech);
    let log_nonspeech = log_not_prob(&p_speech);
    let log_pa = log_prob(&p_a);
    let log_pb = log_prob(&p_b);

    let leak_track = bundle.get(LEAKAGE_TRACK_NAME).or_else(|| bundle.get("leak"));
    let log_leak = match leak_track {
        Some(track) => log_prob(&prob_values(track)?),
        None => Array1::zeros(n_frames),
    };

    let prior = match bundle.get("prior_ab") {
        Some(track) => Some(prior_offsets(track, n_frames)?),
        None => None,
    };

    let mut scores = Array2::zeros((n_frames, NUM_STATES));
    for t in 0..n_frames {
        let (prior_a, prior_b) = prior.as_ref().map_or((0.0, 0.0), |p| p.at(t));
        scores[[t, State::Sil.index()]] = W_SPEECH * log_nonspeech[t];
        scores[[t, State::A.index()]] =
            W_SPEECH * log_speech[t] + W_DIAR * log_pa[t] + W_PRIOR * prior_a;
        scores[[t, State::B.index()]] =
            W_SPEECH * log_speech[t] + W_DIAR * log_pb[t] + W_PRIOR * prior_b;
        scores[[t, State::Ovl.index()]] =
            W_SPEECH * log_speech[t] + W_OVL * (log_pa[t] + log_pb[t]) + OVL_BONUS;
        scores[[t, State::Leak.index()]] =
            W_LEAK * log_leak[t] + W_LEAK_SIL_BIAS * log_nonspeech[t] + LEAK_BASELINE_PENALTY;
    }
    Ok(scores)
}
