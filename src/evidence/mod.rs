//! Soft-evidence model: validated tracks on a shared timebase.
//!
//! Producers turn raw audio into `EvidenceTrack`s on the canonical 10 ms
//! grid; the `EvidenceBundle` groups tracks for fusion. Construction
//! validates shape, finiteness, semantics range, and timebase consistency so
//! everything downstream can assume clean arrays.

pub mod bundle;
pub mod energy;
pub mod leakage;
pub mod prosody;
pub mod synthetic;
pub mod vad;

pub use bundle::EvidenceBundle;

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::resample::{resample_1d, resample_2d, Agg};
use crate::core::{CoreError, TimeBase};

/// Validation failures raised at track/bundle construction or by fusion.
#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("track '{name}' must have at least one frame")]
    EmptyTrack { name: String },

    #[error("track '{name}' contains NaN/Inf values")]
    NonFiniteValues { name: String },

    #[error("track '{name}' has semantics 'probability' but values fall outside ~[0,1]")]
    ProbabilityRange { name: String },

    #[error("track '{name}' confidence shape {got} does not match values shape {expected}")]
    ConfidenceShape {
        name: String,
        got: String,
        expected: String,
    },

    #[error("track '{name}' confidence values fall outside [0,1]")]
    ConfidenceRange { name: String },

    #[error("track '{name}' has {got} frames but its timebase pins n_frames={expected}")]
    FrameCountMismatch {
        name: String,
        got: usize,
        expected: usize,
    },

    #[error("track '{name}' has hop {track_hop}, bundle hop is {bundle_hop}")]
    HopMismatch {
        name: String,
        track_hop: f64,
        bundle_hop: f64,
    },

    #[error("bundle requires canonical hop {expected}, got {got}")]
    NotCanonical { expected: f64, got: f64 },

    #[error("track '{name}' length {got} mismatches bundle length {expected}")]
    LengthMismatch {
        name: String,
        got: usize,
        expected: usize,
    },

    #[error("track '{name}' must have semantics {expected}, got {got}")]
    WrongSemantics {
        name: String,
        expected: String,
        got: String,
    },

    #[error("prior_ab must have shape (2,) or (T,2) for A/B offsets")]
    BadPriorShape,

    #[error("bundle is empty; cannot fuse without tracks")]
    EmptyBundle,

    #[error("cannot merge bundles with different hops: {left} vs {right}")]
    MergeHopMismatch { left: f64, right: f64 },

    #[error("downsampling track '{name}' requires an aggregation (mean|max)")]
    MissingAggregation { name: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("bundle serialization failed for {path}: {message}")]
    Serialization { path: String, message: String },
}

/// Interpretation of track values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Semantics {
    /// Values in [0, 1].
    Probability,
    /// Unbounded log-odds; pass through a logistic before use as probability.
    Logit,
    /// Additive log-domain score.
    Score,
}

impl Semantics {
    pub fn as_str(&self) -> &'static str {
        match self {
            Semantics::Probability => "probability",
            Semantics::Logit => "logit",
            Semantics::Score => "score",
        }
    }
}

impl std::str::FromStr for Semantics {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "probability" => Ok(Semantics::Probability),
            "logit" => Ok(Semantics::Logit),
            "score" => Ok(Semantics::Score),
            other => Err(format!("unknown semantics '{other}'")),
        }
    }
}

/// Track payload: a (T,) vector or a (T, K) matrix with time on axis 0.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackValues {
    Vector(Array1<f64>),
    Matrix(Array2<f64>),
}

impl TrackValues {
    /// Number of frames (length of the time axis).
    pub fn num_frames(&self) -> usize {
        match self {
            TrackValues::Vector(v) => v.len(),
            TrackValues::Matrix(m) => m.nrows(),
        }
    }

    /// Evidence dimensionality: 1 for vectors, K for matrices.
    pub fn width(&self) -> usize {
        match self {
            TrackValues::Vector(_) => 1,
            TrackValues::Matrix(m) => m.ncols(),
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            TrackValues::Vector(v) => v.iter().all(|x| x.is_finite()),
            TrackValues::Matrix(m) => m.iter().all(|x| x.is_finite()),
        }
    }

    fn in_range(&self, lo: f64, hi: f64) -> bool {
        match self {
            TrackValues::Vector(v) => v.iter().all(|&x| x >= lo && x <= hi),
            TrackValues::Matrix(m) => m.iter().all(|&x| x >= lo && x <= hi),
        }
    }

    fn shape_string(&self) -> String {
        match self {
            TrackValues::Vector(v) => format!("({},)", v.len()),
            TrackValues::Matrix(m) => format!("({}, {})", m.nrows(), m.ncols()),
        }
    }

    /// Resample onto another hop; `agg` is needed only when downsampling.
    pub fn resample(
        &self,
        src_hop_s: f64,
        target_hop_s: f64,
        agg: Option<Agg>,
    ) -> Result<TrackValues, CoreError> {
        Ok(match self {
            TrackValues::Vector(v) => {
                TrackValues::Vector(resample_1d(v, src_hop_s, target_hop_s, agg)?)
            }
            TrackValues::Matrix(m) => {
                TrackValues::Matrix(resample_2d(m, src_hop_s, target_hop_s, agg)?)
            }
        })
    }

    /// Flatten to a row-major f64 vector (used by serialization and caching).
    pub fn to_flat_vec(&self) -> Vec<f64> {
        match self {
            TrackValues::Vector(v) => v.to_vec(),
            TrackValues::Matrix(m) => m.iter().copied().collect(),
        }
    }
}

impl From<Vec<f64>> for TrackValues {
    fn from(v: Vec<f64>) -> Self {
        TrackValues::Vector(Array1::from_vec(v))
    }
}

/// Time-aligned soft evidence on a shared timebase.
///
/// Immutable after construction; `new` enforces every invariant:
/// - values have T > 0 and are finite,
/// - probability semantics stay inside [0, 1] with 1e-3 slack,
/// - confidence (when present) matches the values' shape and sits in [0, 1],
/// - a pinned `n_frames` on the timebase matches the actual length.
#[derive(Debug, Clone)]
pub struct EvidenceTrack {
    name: String,
    timebase: TimeBase,
    values: TrackValues,
    semantics: Semantics,
    confidence: Option<TrackValues>,
    metadata: BTreeMap<String, String>,
}

/// Slack allowed around [0, 1] for probability semantics.
const PROBABILITY_SLACK: f64 = 1e-3;

impl EvidenceTrack {
    pub fn new(
        name: impl Into<String>,
        timebase: TimeBase,
        values: TrackValues,
        semantics: Semantics,
    ) -> Result<Self, EvidenceError> {
        Self::with_details(name, timebase, values, semantics, None, BTreeMap::new())
    }

    pub fn with_details(
        name: impl Into<String>,
        timebase: TimeBase,
        values: TrackValues,
        semantics: Semantics,
        confidence: Option<TrackValues>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Self, EvidenceError> {
        let name = name.into();

        if values.num_frames() == 0 {
            return Err(EvidenceError::EmptyTrack { name });
        }
        if !values.is_finite() {
            return Err(EvidenceError::NonFiniteValues { name });
        }
        if semantics == Semantics::Probability
            && !values.in_range(-PROBABILITY_SLACK, 1.0 + PROBABILITY_SLACK)
        {
            return Err(EvidenceError::ProbabilityRange { name });
        }
        if let Some(expected) = timebase.n_frames {
            if values.num_frames() != expected {
                return Err(EvidenceError::FrameCountMismatch {
                    name,
                    got: values.num_frames(),
                    expected,
                });
            }
        }
        if let Some(conf) = &confidence {
            if conf.num_frames() != values.num_frames() || conf.width() != values.width() {
                return Err(EvidenceError::ConfidenceShape {
                    name,
                    got: conf.shape_string(),
                    expected: values.shape_string(),
                });
            }
            if !conf.is_finite() || !conf.in_range(0.0, 1.0) {
                return Err(EvidenceError::ConfidenceRange { name });
            }
        }

        Ok(Self {
            name,
            timebase,
            values,
            semantics,
            confidence,
            metadata,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timebase(&self) -> &TimeBase {
        &self.timebase
    }

    pub fn values(&self) -> &TrackValues {
        &self.values
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    pub fn confidence(&self) -> Option<&TrackValues> {
        self.confidence.as_ref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Number of frames.
    pub fn num_frames(&self) -> usize {
        self.values.num_frames()
    }

    /// Evidence dimensionality (1 for vectors).
    pub fn width(&self) -> usize {
        self.values.width()
    }

    /// View the values as a 1-D array, or `None` for matrix tracks.
    pub fn as_vector(&self) -> Option<&Array1<f64>> {
        match &self.values {
            TrackValues::Vector(v) => Some(v),
            TrackValues::Matrix(_) => None,
        }
    }

    /// Resample onto a new timebase. Confidence resamples with `mean`.
    pub fn resample_to(
        &self,
        timebase: TimeBase,
        agg: Option<Agg>,
    ) -> Result<EvidenceTrack, EvidenceError> {
        let needs_downsample = self.timebase.hop_s < timebase.hop_s;
        if needs_downsample && agg.is_none() {
            return Err(EvidenceError::MissingAggregation {
                name: self.name.clone(),
            });
        }
        let values = self.values.resample(self.timebase.hop_s, timebase.hop_s, agg)?;
        let confidence = match &self.confidence {
            Some(c) => Some(c.resample(self.timebase.hop_s, timebase.hop_s, Some(Agg::Mean))?),
            None => None,
        };
        let mut target = timebase;
        target.n_frames = Some(values.num_frames());
        EvidenceTrack::with_details(
            self.name.clone(),
            target,
            values,
            self.semantics,
            confidence,
            self.metadata.clone(),
        )
    }
}
