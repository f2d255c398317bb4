//! Prosodic cue tracks.
//!
//! Thin producers over the VAD and energy modules: a voicing probability and
//! the energy slope exposed under prosody naming.

use std::path::Path;

use anyhow::Result;

use super::energy::compute_energy_slope_track;
use super::vad::build_soft_track;
use super::EvidenceTrack;

/// Soft voicing probability on the canonical grid.
pub fn compute_voiced_soft_track(
    audio_path: &Path,
    vad_mode: u8,
    cache_dir: Option<&Path>,
) -> Result<EvidenceTrack> {
    build_soft_track(audio_path, vad_mode, cache_dir, "voiced_soft", "voiced_soft")
}

/// Energy slope as a prosodic cue.
pub fn compute_energy_slope_prosody_track(
    audio_path: &Path,
    smooth_ms: f64,
    cache_dir: Option<&Path>,
) -> Result<EvidenceTrack> {
    compute_energy_slope_track(audio_path, None, smooth_ms, cache_dir)
}
