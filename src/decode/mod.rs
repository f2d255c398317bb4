//! Structured decoding: evidence fusion, transition constraints, the
//! duration-aware Viterbi decoder, and IPU extraction.

pub mod constraints;
pub mod decoder;
pub mod fusion;
pub mod ipu;
pub mod params;
pub mod state_space;

pub use ipu::Segment;
pub use params::DecodeTuningParams;
pub use state_space::{State, NUM_STATES};

use thiserror::Error;

/// Shape and input errors raised by the decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("scores must have shape (T, {expected}), got second dim {got}")]
    BadScoreWidth { expected: usize, got: usize },

    #[error("scores must contain at least one frame")]
    EmptyScores,

    #[error("transition must have shape ({expected}, {expected}), got ({rows}, {cols})")]
    BadTransitionShape {
        expected: usize,
        rows: usize,
        cols: usize,
    },

    #[error("initial must have shape ({expected},), got ({got},)")]
    BadInitialShape { expected: usize, got: usize },

    #[error("scores contain NaN values")]
    NanScores,
}
