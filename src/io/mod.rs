//! File-format boundaries: audio decoding, Praat TextGrid interchange, and
//! the JSON artifact writers.

pub mod artifacts;
pub mod audio;
pub mod textgrid;
