//! Soft speech-activity evidence from the Silero VAD.
//!
//! The detector scores 512-sample windows at 16 kHz. Windows advance by
//! 30 ms (an exact 3x multiple of the canonical hop), the per-window
//! probabilities are held onto the 10 ms grid, and a short box filter blurs
//! the result so downstream fusion sees fractional values instead of hard
//! 0/1 plateaus.

use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array1;
use serde_json::json;
use tracing::debug;
use voice_activity_detector::VoiceActivityDetector;

use crate::core::cache::{cache_get, cache_put, make_cache_key, CachedArrays};
use crate::core::resample::upsample_hold_1d;
use crate::core::TimeBase;
use crate::io::audio::load_audio_mono;

use super::{EvidenceTrack, Semantics, TrackValues};

/// Sample rate the detector operates at.
const VAD_SAMPLE_RATE: u32 = 16_000;

/// Detector window size in samples (Silero's preferred chunk).
const VAD_WINDOW: usize = 512;

/// Window hop in samples: 30 ms at 16 kHz, an exact 3x of the canonical hop.
const VAD_HOP: usize = 480;

/// Box-smoothing kernel width in canonical frames.
const SMOOTH_KERNEL: usize = 9;

/// Compute the soft VAD track for an audio file on the canonical grid.
///
/// `vad_mode` (0..=3) biases the detector the way the aggressiveness knob on
/// a hard VAD would: higher modes shift probabilities toward silence. Mode 2
/// is neutral.
pub fn compute_vad_soft_track(
    audio_path: &Path,
    vad_mode: u8,
    cache_dir: Option<&Path>,
) -> Result<EvidenceTrack> {
    build_soft_track(audio_path, vad_mode, cache_dir, "vad_soft", "vad")
}

pub(crate) fn build_soft_track(
    audio_path: &Path,
    vad_mode: u8,
    cache_dir: Option<&Path>,
    func: &str,
    track_name: &str,
) -> Result<EvidenceTrack> {
    let key = make_cache_key(audio_path, func, &json!({ "vad_mode": vad_mode }))?;
    if let Some(cached) = cache_get(cache_dir, &key) {
        let n = cached.values.len();
        return Ok(EvidenceTrack::new(
            track_name,
            TimeBase::canonical_with_frames(n),
            TrackValues::from(cached.values),
            Semantics::Probability,
        )?);
    }

    let (samples, sr) = load_audio_mono(audio_path, None)?;
    let samples_16k = resample_linear(&samples, sr, VAD_SAMPLE_RATE);

    let tb = TimeBase::canonical();
    let n_frames = tb.num_frames(samples_16k.len() as f64 / VAD_SAMPLE_RATE as f64);
    let n_windows = samples_16k.len().div_ceil(VAD_HOP).max(1);

    let mut padded = samples_16k;
    padded.resize((n_windows - 1) * VAD_HOP + VAD_WINDOW, 0.0);

    let mut vad = VoiceActivityDetector::builder()
        .sample_rate(VAD_SAMPLE_RATE as i64)
        .chunk_size(VAD_WINDOW)
        .build()
        .context("failed to create VAD")?;

    let shift = (f64::from(vad_mode) - 2.0) * 0.5;
    let mut window_probs = Array1::zeros(n_windows);
    for w in 0..n_windows {
        let start = w * VAD_HOP;
        let chunk = &padded[start..start + VAD_WINDOW];
        let p = f64::from(vad.predict(chunk.iter().copied()));
        window_probs[w] = bias_probability(p, shift);
    }

    // 30 ms windows onto the 10 ms grid, trimmed to the audio length.
    let held = upsample_hold_1d(&window_probs, 0.03, 0.01)?;
    let mut values: Vec<f64> = held.iter().copied().take(n_frames).collect();
    values.resize(n_frames, 0.0);

    let smoothed = box_smooth(&values, SMOOTH_KERNEL);
    debug!(
        "VAD track for {}: {} windows -> {} frames (mode {})",
        audio_path.display(),
        n_windows,
        n_frames,
        vad_mode
    );

    cache_put(
        cache_dir,
        &key,
        &CachedArrays::from_values(smoothed.clone()),
    )?;
    Ok(EvidenceTrack::new(
        track_name,
        TimeBase::canonical_with_frames(n_frames),
        TrackValues::from(smoothed),
        Semantics::Probability,
    )?)
}

/// Shift a probability in logit space, clamping away from exact 0/1.
fn bias_probability(p: f64, shift: f64) -> f64 {
    if shift == 0.0 {
        return p.clamp(0.0, 1.0);
    }
    let clamped = p.clamp(1e-6, 1.0 - 1e-6);
    let logit = (clamped / (1.0 - clamped)).ln() - shift;
    1.0 / (1.0 + (-logit).exp())
}

/// Zero-padded moving average with an odd kernel width.
fn box_smooth(values: &[f64], kernel: usize) -> Vec<f64> {
    if values.len() <= 1 || kernel <= 1 {
        return values.to_vec();
    }
    let half = kernel / 2;
    let scale = 1.0 / kernel as f64;
    (0..values.len())
        .map(|i| {
            let mut acc = 0.0;
            for k in 0..kernel {
                let idx = i as isize + k as isize - half as isize;
                if idx >= 0 && (idx as usize) < values.len() {
                    acc += values[idx as usize];
                }
            }
            acc * scale
        })
        .collect()
}

/// Linear-interpolation resample, adequate for feature extraction prep.
pub(crate) fn resample_linear(samples: &[f32], sr_in: u32, sr_out: u32) -> Vec<f32> {
    if sr_in == sr_out || samples.is_empty() {
        return samples.to_vec();
    }
    let n_out = ((samples.len() as u64 * sr_out as u64) / sr_in as u64) as usize;
    let ratio = sr_in as f64 / sr_out as f64;
    (0..n_out)
        .map(|i| {
            let pos = i as f64 * ratio;
            let i0 = pos.floor() as usize;
            let i1 = (i0 + 1).min(samples.len() - 1);
            let frac = (pos - i0 as f64) as f32;
            samples[i0] * (1.0 - frac) + samples[i1] * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_smooth_constant_signal() {
        let x = vec![0.5; 20];
        let out = box_smooth(&x, 9);
        // interior frames keep the constant value
        assert!((out[10] - 0.5).abs() < 1e-12);
        // edges shrink toward zero because of zero padding
        assert!(out[0] < 0.5);
    }

    #[test]
    fn test_box_smooth_short_input_passthrough() {
        assert_eq!(box_smooth(&[0.7], 9), vec![0.7]);
    }

    #[test]
    fn test_bias_probability_neutral_mode() {
        assert_eq!(bias_probability(0.42, 0.0), 0.42);
    }

    #[test]
    fn test_bias_probability_direction() {
        // positive shift (more aggressive) lowers speech probability
        assert!(bias_probability(0.5, 0.5) < 0.5);
        assert!(bias_probability(0.5, -0.5) > 0.5);
        // stays in range at extremes
        assert!(bias_probability(1.0, 1.5) <= 1.0);
        assert!(bias_probability(0.0, -1.5) >= 0.0);
    }

    #[test]
    fn test_resample_linear_identity_and_ratio() {
        let x: Vec<f32> = (0..100).map(|i| i as f32).collect();
        assert_eq!(resample_linear(&x, 16000, 16000), x);
        let half = resample_linear(&x, 16000, 8000);
        assert_eq!(half.len(), 50);
        assert!((half[1] - 2.0).abs() < 1e-4);
    }
}
