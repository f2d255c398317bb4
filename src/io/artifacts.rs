//! JSON artifact writers for the per-item output tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::decode::decoder::DecodeDiagnostics;
use crate::decode::State;
use crate::evidence::bundle::TrackFile;
use crate::evidence::EvidenceTrack;

/// Write any serializable value as pretty-printed JSON, creating parents.
pub fn save_json<T: Serialize>(data: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(data).context("failed to serialize JSON artifact")?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Write an evidence track (values, optional confidence, metadata).
pub fn save_evidence_track(track: &EvidenceTrack, path: &Path) -> Result<()> {
    save_json(&TrackFile::from_track(track), path)
}

/// Write a decoded label stream as a JSON array of label strings.
pub fn save_states(states: &[State], path: &Path) -> Result<()> {
    let labels: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
    save_json(&labels, path)
}

/// Load a label stream previously written with [`save_states`].
pub fn load_states(path: &Path) -> Result<Vec<State>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read states {}", path.display()))?;
    let labels: Vec<String> =
        serde_json::from_str(&text).with_context(|| format!("invalid states file {}", path.display()))?;
    labels
        .iter()
        .map(|label| {
            State::from_label(label)
                .ok_or_else(|| anyhow::anyhow!("unknown state label '{label}' in {}", path.display()))
        })
        .collect()
}

/// Write decode diagnostics under `decode/<stem>_diagnostics.json`.
pub fn dump_diagnostics(
    out_dir: &Path,
    stem: &str,
    diagnostics: &DecodeDiagnostics,
) -> Result<PathBuf> {
    let path = out_dir.join("decode").join(format!("{stem}_diagnostics.json"));
    save_json(diagnostics, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TimeBase;
    use crate::evidence::{Semantics, TrackValues};

    #[test]
    fn test_states_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decode").join("x_states.json");
        let states = vec![State::Sil, State::A, State::Ovl, State::Leak, State::B];
        save_states(&states, &path).unwrap();
        assert_eq!(load_states(&path).unwrap(), states);
    }

    #[test]
    fn test_load_states_rejects_unknown_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[\"A\", \"WAT\"]").unwrap();
        assert!(load_states(&path).is_err());
    }

    #[test]
    fn test_evidence_track_written_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence").join("x_vad.json");
        let track = EvidenceTrack::new(
            "vad",
            TimeBase::canonical_with_frames(2),
            TrackValues::from(vec![0.2, 0.8]),
            Semantics::Probability,
        )
        .unwrap();
        save_evidence_track(&track, &path).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["name"], "vad");
        assert_eq!(parsed["semantics"], "probability");
        assert_eq!(parsed["values"][1], 0.8);
    }

    #[test]
    fn test_dump_diagnostics_path() {
        let dir = tempfile::tempdir().unwrap();
        let diag = DecodeDiagnostics {
            ipu_start_after_leak_count: 3,
        };
        let path = dump_diagnostics(dir.path(), "conv", &diag).unwrap();
        assert!(path.ends_with("decode/conv_diagnostics.json"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("ipu_start_after_leak_count"));
    }
}
