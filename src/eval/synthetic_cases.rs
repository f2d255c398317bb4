//! Deterministic synthetic evaluation scenarios.
//!
//! Synthetic manifest items carry a `scenario` name instead of an audio
//! path; materialization writes the generated audio and reference labels to
//! disk and returns the resolved item.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::decode::State;
use crate::io::audio::write_wav;

use super::harness::ManifestItem;

pub const SAMPLE_RATE: u32 = 16_000;
pub const LEAKAGE_STRESS_ID: &str = "leakage_stress";

fn tone(freq_hz: f32, n_samples: usize, amplitude: f32) -> Vec<f32> {
    (0..n_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * freq_hz * t).sin()
        })
        .collect()
}

/// Seven half-second blocks: SIL, A, SIL, LEAK, SIL, B, SIL.
///
/// The leak block carries the A tone strongly on the left channel with a
/// faint copy on the right; the B block plays equally on both channels at a
/// different frequency.
fn build_leakage_stress_audio() -> (Vec<f32>, Vec<f32>, Vec<State>) {
    let segment = (0.5 * SAMPLE_RATE as f32) as usize;
    let silence = vec![0.0f32; segment];
    let tone_a = tone(220.0, segment, 0.06);
    let tone_b = tone(330.0, segment, 0.06);
    let leak = tone(220.0, segment, 0.05);

    let scaled = |signal: &[f32], gain: f32| signal.iter().map(|s| s * gain).collect::<Vec<f32>>();

    let mut left = Vec::with_capacity(7 * segment);
    left.extend_from_slice(&silence);
    left.extend_from_slice(&tone_a);
    left.extend_from_slice(&silence);
    left.extend_from_slice(&leak);
    left.extend_from_slice(&silence);
    left.extend_from_slice(&tone_b);
    left.extend_from_slice(&silence);

    let mut right = Vec::with_capacity(7 * segment);
    right.extend_from_slice(&silence);
    right.extend(scaled(&tone_a, 0.03));
    right.extend_from_slice(&silence);
    right.extend(scaled(&leak, 0.01));
    right.extend_from_slice(&silence);
    right.extend_from_slice(&tone_b);
    right.extend_from_slice(&silence);

    let mut ref_states = Vec::with_capacity(350);
    for state in [
        State::Sil,
        State::A,
        State::Sil,
        State::Leak,
        State::Sil,
        State::B,
        State::Sil,
    ] {
        ref_states.extend(std::iter::repeat(state).take(50));
    }
    (left, right, ref_states)
}

/// Materialize a synthetic item: write audio + reference, return the
/// resolved item with concrete paths.
pub fn materialize_synthetic_case(item: &ManifestItem, out_dir: &Path) -> Result<ManifestItem> {
    let scenario = item.scenario.as_deref().unwrap_or("").trim().to_string();
    if scenario != LEAKAGE_STRESS_ID {
        bail!("unsupported synthetic scenario '{scenario}'");
    }

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let stem = &item.id;
    let audio_path = out_dir.join(format!("{stem}.wav"));
    let ref_path = out_dir.join(format!("{stem}_ref.json"));

    let (left, right, ref_states) = build_leakage_stress_audio();
    write_wav(&audio_path, &[left, right], SAMPLE_RATE)?;

    let labels: Vec<&str> = ref_states.iter().map(|s| s.as_str()).collect();
    let text = serde_json::to_string(&labels).context("failed to serialize reference labels")?;
    std::fs::write(&ref_path, text)
        .with_context(|| format!("failed to write {}", ref_path.display()))?;

    let mut resolved = item.clone();
    resolved.audio_path = Some(audio_path);
    resolved.ref_path = Some(ref_path);
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(scenario: &str) -> ManifestItem {
        ManifestItem {
            id: "leakage_stress".to_string(),
            tier: "synthetic".to_string(),
            audio_path: None,
            ref_path: None,
            scenario: Some(scenario.to_string()),
        }
    }

    #[test]
    fn test_materialize_writes_audio_and_reference() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = materialize_synthetic_case(&item(LEAKAGE_STRESS_ID), dir.path()).unwrap();

        let audio_path = resolved.audio_path.unwrap();
        let ref_path = resolved.ref_path.unwrap();
        assert!(audio_path.exists());
        assert!(ref_path.exists());

        let audio = crate::io::audio::load_audio(&audio_path).unwrap();
        assert_eq!(audio.num_channels(), 2);
        // 7 blocks of 0.5 s at 16 kHz
        assert_eq!(audio.num_samples(), 7 * 8000);

        let labels: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(&ref_path).unwrap()).unwrap();
        assert_eq!(labels.len(), 350);
        assert_eq!(labels[0], "SIL");
        assert_eq!(labels[75], "A");
        assert_eq!(labels[175], "LEAK");
        assert_eq!(labels[275], "B");
    }

    #[test]
    fn test_unknown_scenario_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(materialize_synthetic_case(&item("nope"), dir.path()).is_err());
    }
}
