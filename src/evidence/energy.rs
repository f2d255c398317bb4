//! Frame-energy evidence: raw RMS, a smoothed envelope, and its slope.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use crate::core::cache::{cache_get, cache_put, make_cache_key, CachedArrays};
use crate::core::{TimeBase, CANONICAL_HOP_S};
use crate::io::audio::load_audio_mono;

use super::{EvidenceTrack, Semantics, TrackValues};

/// Default smoothing window in milliseconds.
pub const SMOOTH_MS_DEFAULT: f64 = 80.0;

fn score_track(name: &str, values: Vec<f64>) -> Result<EvidenceTrack> {
    let tb = TimeBase::canonical_with_frames(values.len());
    Ok(EvidenceTrack::new(
        name,
        tb,
        TrackValues::from(values),
        Semantics::Score,
    )?)
}

fn frame_rms(samples: &[f32], sr: u32, hop_s: f64) -> Vec<f64> {
    let hop = (sr as f64 * hop_s).round() as usize;
    let n_frames = samples.len() / hop.max(1);
    (0..n_frames)
        .map(|i| {
            let frame = &samples[i * hop..(i + 1) * hop];
            let sum_sq: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
            (sum_sq / hop as f64).sqrt()
        })
        .collect()
}

/// Centered moving average over a window of `smooth_ms`.
fn smooth(values: &[f64], smooth_ms: f64, hop_s: f64) -> Vec<f64> {
    let win = ((smooth_ms / (hop_s * 1000.0)).round() as usize).max(1);
    if win == 1 || values.is_empty() {
        return values.to_vec();
    }
    let scale = 1.0 / win as f64;
    let half = win / 2;
    (0..values.len())
        .map(|i| {
            let mut acc = 0.0;
            for k in 0..win {
                let idx = i as isize + k as isize - half as isize;
                if idx >= 0 && (idx as usize) < values.len() {
                    acc += values[idx as usize];
                }
            }
            acc * scale
        })
        .collect()
}

/// Per-frame RMS on the canonical grid.
pub fn compute_energy_rms_track(
    audio_path: &Path,
    channel: Option<usize>,
    cache_dir: Option<&Path>,
) -> Result<EvidenceTrack> {
    let key = make_cache_key(audio_path, "energy_rms", &json!({ "channel": channel }))?;
    if let Some(cached) = cache_get(cache_dir, &key) {
        return score_track("energy_rms", cached.values);
    }

    let (samples, sr) = load_audio_mono(audio_path, channel)?;
    let rms = frame_rms(&samples, sr, CANONICAL_HOP_S);
    cache_put(cache_dir, &key, &CachedArrays::from_values(rms.clone()))?;
    score_track("energy_rms", rms)
}

/// Moving-average smoothed RMS envelope.
pub fn compute_energy_smooth_track(
    audio_path: &Path,
    channel: Option<usize>,
    smooth_ms: f64,
    cache_dir: Option<&Path>,
) -> Result<EvidenceTrack> {
    let key = make_cache_key(
        audio_path,
        "energy_smooth",
        &json!({ "channel": channel, "smooth_ms": smooth_ms }),
    )?;
    if let Some(cached) = cache_get(cache_dir, &key) {
        return score_track("energy_smooth", cached.values);
    }

    let base = compute_energy_rms_track(audio_path, channel, cache_dir)?;
    let smoothed = smooth(
        base.as_vector().map(|v| v.to_vec()).unwrap_or_default().as_slice(),
        smooth_ms,
        CANONICAL_HOP_S,
    );
    cache_put(cache_dir, &key, &CachedArrays::from_values(smoothed.clone()))?;
    score_track("energy_smooth", smoothed)
}

/// Slope of the smoothed envelope, per second.
///
/// The final 20 ms is zeroed: the frame trim at the file tail otherwise
/// shows up as a spurious negative spike.
pub fn compute_energy_slope_track(
    audio_path: &Path,
    channel: Option<usize>,
    smooth_ms: f64,
    cache_dir: Option<&Path>,
) -> Result<EvidenceTrack> {
    let key = make_cache_key(
        audio_path,
        "energy_slope",
        &json!({ "channel": channel, "smooth_ms": smooth_ms }),
    )?;
    if let Some(cached) = cache_get(cache_dir, &key) {
        return score_track("energy_slope", cached.values);
    }

    let smooth_track = compute_energy_smooth_track(audio_path, channel, smooth_ms, cache_dir)?;
    let vals: Vec<f64> = smooth_track
        .as_vector()
        .map(|v| v.to_vec())
        .unwrap_or_default();

    let mut slope = vec![0.0; vals.len()];
    for i in 1..vals.len() {
        slope[i] = (vals[i] - vals[i - 1]) / CANONICAL_HOP_S;
    }
    let mut slope = smooth(&slope, 20.0, CANONICAL_HOP_S);
    let tail = ((20.0 / (CANONICAL_HOP_S * 1000.0)).round() as usize).max(1);
    if tail < slope.len() {
        let n = slope.len();
        for v in &mut slope[n - tail..] {
            *v = 0.0;
        }
    }

    cache_put(cache_dir, &key, &CachedArrays::from_values(slope.clone()))?;
    score_track("energy_slope", slope)
}
