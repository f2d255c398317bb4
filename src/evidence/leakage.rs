//! Stereo leakage likelihood.
//!
//! Leak frames show one dominant channel whose spectrum nonetheless matches
//! the other channel closely (the same voice picked up by both mics). The
//! per-frame likelihood is the product of three cues on the canonical grid:
//! channel-dominance strength, cosine similarity of pooled log spectra over
//! a 25 ms centered window, and an energy gate normalized by the 90th
//! percentile of total energy.

use std::path::Path;

use anyhow::{bail, Result};
use rustfft::{num_complex::Complex, FftPlanner};
use serde_json::json;
use tracing::debug;

use crate::core::cache::{cache_get, cache_put, make_cache_key, CachedArrays};
use crate::core::{TimeBase, CANONICAL_HOP_S};
use crate::io::audio::load_audio;

use super::{EvidenceTrack, Semantics, TrackValues};

/// Canonical name of the leakage evidence track.
pub const LEAKAGE_TRACK_NAME: &str = "leakage_likelihood";

/// Number of pooled spectrum bins compared across channels.
pub const DEFAULT_SPEC_BINS: usize = 64;

/// Spectral comparison window in milliseconds.
pub const DEFAULT_WIN_MS: f64 = 25.0;

const EPS: f64 = 1e-8;

/// Compute the stereo leakage likelihood on the canonical grid.
///
/// Mono input is an error; callers with mono audio skip this producer. For
/// files with more than two channels only the first two are used.
pub fn compute_leakage_likelihood(
    audio_path: &Path,
    cache_dir: Option<&Path>,
) -> Result<EvidenceTrack> {
    let params = json!({
        "spec_bins": DEFAULT_SPEC_BINS,
        "win_ms": DEFAULT_WIN_MS,
    });
    let key = make_cache_key(audio_path, "leakage_likelihood", &params)?;
    if let Some(cached) = cache_get(cache_dir, &key) {
        return leak_track(cached.values, "cache");
    }

    let audio = load_audio(audio_path)?;
    let Some((left, right)) = audio.stereo_pair() else {
        bail!(
            "leakage likelihood requires stereo input (2 channels), got {} for {}",
            audio.num_channels(),
            audio_path.display()
        );
    };
    let sample_rate = audio.sample_rate;

    let hop_samples = (sample_rate as f64 * CANONICAL_HOP_S).round() as usize;
    if hop_samples == 0 {
        bail!("hop too small for sample rate {sample_rate}");
    }
    let n_frames = left.len().min(right.len()) / hop_samples;
    if n_frames == 0 {
        bail!("audio too short for one 10 ms frame: {}", audio_path.display());
    }

    let energy_left = rms_per_frame(left, hop_samples, n_frames);
    let energy_right = rms_per_frame(right, hop_samples, n_frames);

    let win_samples = ((sample_rate as f64 * DEFAULT_WIN_MS / 1000.0).round() as usize).max(1);
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(win_samples);
    let hann: Vec<f64> = (0..win_samples)
        .map(|n| {
            if win_samples == 1 {
                1.0
            } else {
                0.5 * (1.0
                    - (2.0 * std::f64::consts::PI * n as f64 / (win_samples - 1) as f64).cos())
            }
        })
        .collect();

    let total_energy: Vec<f64> = energy_left
        .iter()
        .zip(energy_right.iter())
        .map(|(l, r)| l + r)
        .collect();
    let ref_energy = percentile(&total_energy, 90.0);

    let mut values = Vec::with_capacity(n_frames);
    let mut scratch = vec![Complex::new(0.0, 0.0); win_samples];
    for frame in 0..n_frames {
        let dominance =
            (energy_left[frame] - energy_right[frame]) / (energy_left[frame] + energy_right[frame] + EPS);
        let dom_strength = dominance.abs().clamp(0.0, 1.0);

        let center = frame * hop_samples + hop_samples / 2;
        let spec_left = pooled_log_spectrum(left, center, win_samples, &hann, &*fft, &mut scratch);
        let spec_right =
            pooled_log_spectrum(right, center, win_samples, &hann, &*fft, &mut scratch);
        let cos_sim = cosine_similarity(&spec_left, &spec_right).clamp(0.0, 1.0);

        let gate = (total_energy[frame] / (ref_energy + EPS)).clamp(0.0, 1.0);
        values.push((dom_strength * cos_sim * gate).clamp(0.0, 1.0));
    }

    debug!(
        "Leakage track for {}: {} frames at {} Hz",
        audio_path.display(),
        n_frames,
        sample_rate
    );
    cache_put(cache_dir, &key, &CachedArrays::from_values(values.clone()))?;
    leak_track(values, "computed")
}

fn leak_track(values: Vec<f64>, source: &str) -> Result<EvidenceTrack> {
    let tb = TimeBase::canonical_with_frames(values.len());
    let mut metadata = std::collections::BTreeMap::new();
    metadata.insert("source".to_string(), source.to_string());
    Ok(EvidenceTrack::with_details(
        LEAKAGE_TRACK_NAME,
        tb,
        TrackValues::from(values),
        Semantics::Probability,
        None,
        metadata,
    )?)
}

fn rms_per_frame(channel: &[f32], hop_samples: usize, n_frames: usize) -> Vec<f64> {
    (0..n_frames)
        .map(|i| {
            let frame = &channel[i * hop_samples..(i + 1) * hop_samples];
            let sum_sq: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
            (sum_sq / hop_samples as f64).sqrt()
        })
        .collect()
}

/// Extract a zero-padded window centered on `center_sample`.
fn centered_window(channel: &[f32], center_sample: usize, win_samples: usize) -> Vec<f64> {
    let half = win_samples / 2;
    let start = center_sample as isize - half as isize;
    (0..win_samples)
        .map(|k| {
            let idx = start + k as isize;
            if idx >= 0 && (idx as usize) < channel.len() {
                f64::from(channel[idx as usize])
            } else {
                0.0
            }
        })
        .collect()
}

/// Hann-windowed power spectrum pooled into `DEFAULT_SPEC_BINS` log bins.
fn pooled_log_spectrum(
    channel: &[f32],
    center_sample: usize,
    win_samples: usize,
    hann: &[f64],
    fft: &dyn rustfft::Fft<f64>,
    scratch: &mut [Complex<f64>],
) -> Vec<f64> {
    let window = centered_window(channel, center_sample, win_samples);
    for (slot, (&s, &w)) in scratch.iter_mut().zip(window.iter().zip(hann.iter())) {
        *slot = Complex::new(s * w, 0.0);
    }
    fft.process(scratch);

    // one-sided power spectrum
    let n_bins = win_samples / 2 + 1;
    let power: Vec<f64> = scratch[..n_bins].iter().map(|c| c.norm_sqr()).collect();

    pool_bins(&power, DEFAULT_SPEC_BINS)
        .into_iter()
        .map(f64::ln_1p)
        .collect()
}

/// Pool a spectrum into `bins` chunks of near-equal size (the first
/// `len % bins` chunks take one extra element), averaging each chunk.
fn pool_bins(power: &[f64], bins: usize) -> Vec<f64> {
    if power.len() < bins {
        let mut padded = vec![0.0; bins];
        padded[..power.len()].copy_from_slice(power);
        return padded;
    }
    let base = power.len() / bins;
    let rem = power.len() % bins;
    let mut out = Vec::with_capacity(bins);
    let mut start = 0;
    for b in 0..bins {
        let len = base + usize::from(b < rem);
        let chunk = &power[start..start + len];
        out.push(chunk.iter().sum::<f64>() / len as f64);
        start += len;
    }
    out
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    dot / (norm_a * norm_b + EPS)
}

/// Linear-interpolation percentile over a copy of the data.
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = (q / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::audio::write_wav;

    fn tone(freq_hz: f32, sr: u32, n: usize, amplitude: f32) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let t = i as f32 / sr as f32;
                amplitude * (2.0 * std::f32::consts::PI * freq_hz * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_mono_input_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, &[tone(220.0, 16000, 4800, 0.2)], 16000).unwrap();
        assert!(compute_leakage_likelihood(&path, None).is_err());
    }

    #[test]
    fn test_leak_segment_scores_high() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let sr = 16000;
        let seg = 8000; // 0.5 s

        // Segment 1: same tone on both channels, left dominant (leak).
        // Segment 2: different tones at equal level (genuine overlap).
        let mut left = tone(220.0, sr, seg, 0.4);
        left.extend(tone(220.0, sr, seg, 0.4));
        let mut right = tone(220.0, sr, seg, 0.04);
        right.extend(tone(330.0, sr, seg, 0.4));
        write_wav(&path, &[left, right], sr).unwrap();

        let track = compute_leakage_likelihood(&path, None).unwrap();
        assert_eq!(track.num_frames(), 100);
        let v = track.as_vector().unwrap();

        let leak_mean: f64 = v.iter().take(50).sum::<f64>() / 50.0;
        let ovl_mean: f64 = v.iter().skip(50).sum::<f64>() / 50.0;
        assert!(
            leak_mean > ovl_mean,
            "leak region should outscore overlap region: {leak_mean} vs {ovl_mean}"
        );
        assert!(v.iter().all(|&x| (0.0..=1.0).contains(&x)));
    }

    #[test]
    fn test_percentile_interpolation() {
        let values = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), 0.0);
        assert_eq!(percentile(&values, 100.0), 4.0);
        assert_eq!(percentile(&values, 50.0), 2.0);
        assert!((percentile(&values, 90.0) - 3.6).abs() < 1e-12);
    }

    #[test]
    fn test_pool_bins_uneven_split() {
        let power = vec![1.0; 10];
        let pooled = pool_bins(&power, 3);
        assert_eq!(pooled.len(), 3);
        for v in pooled {
            assert!((v - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_pool_bins_pads_short_spectrum() {
        let pooled = pool_bins(&[2.0, 2.0], 4);
        assert_eq!(pooled, vec![2.0, 2.0, 0.0, 0.0]);
    }
}
