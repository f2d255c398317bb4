//! Core numeric plumbing shared by every stage: the canonical timebase,
//! integer-factor resampling, and the on-disk evidence cache.

pub mod cache;
pub mod resample;
pub mod timebase;

pub use resample::Agg;
pub use timebase::{TimeBase, CANONICAL_HOP_S, HOP_TOLERANCE};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the core layer (timebase construction, resampling, cache I/O).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("hop_s must be positive, got {0}")]
    NonPositiveHop(f64),

    #[error("resampling requires an integer ratio between hops; got src_hop={src_hop_s}, target_hop={target_hop_s}, ratio={ratio:.6}")]
    NonIntegerRatio {
        src_hop_s: f64,
        target_hop_s: f64,
        ratio: f64,
    },

    #[error("length {len} not divisible by factor {factor} for downsampling")]
    NotDivisible { len: usize, factor: usize },

    #[error("downsampling requires an aggregation (mean|max)")]
    MissingAggregation,

    #[error("cache path not found: {0}")]
    CachePathMissing(PathBuf),

    #[error("cache I/O failed for {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache entry is not valid JSON: {0}")]
    CacheFormat(#[from] serde_json::Error),
}
