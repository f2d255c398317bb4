//! Named evaluation suites.
//!
//! A suite is a built-in item list addressed by name from the CLI; suite
//! resolution writes the materialized manifest next to the run outputs so
//! the exact item set is recorded.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use super::harness::ManifestItem;
use super::synthetic_cases::LEAKAGE_STRESS_ID;

/// Items for a named suite.
///
/// `segments` optionally restricts the suite to a subset of tiers.
pub fn load_suite_items(name: &str, segments: &[String]) -> Result<Vec<ManifestItem>> {
    let items = match name {
        "synthetic" => vec![ManifestItem {
            id: LEAKAGE_STRESS_ID.to_string(),
            tier: "synthetic".to_string(),
            audio_path: None,
            ref_path: None,
            scenario: Some(LEAKAGE_STRESS_ID.to_string()),
        }],
        other => bail!("unknown suite '{other}' (available: synthetic)"),
    };
    if segments.is_empty() {
        return Ok(items);
    }
    Ok(items
        .into_iter()
        .filter(|item| segments.iter().any(|s| s == &item.tier))
        .collect())
}

/// Write resolved suite items as a manifest file and return its path.
pub fn write_manifest(items: &[ManifestItem], path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(items).context("failed to serialize manifest")?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_suite() {
        let items = load_suite_items("synthetic", &[]).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].tier, "synthetic");
        assert_eq!(items[0].scenario.as_deref(), Some(LEAKAGE_STRESS_ID));
    }

    #[test]
    fn test_unknown_suite_rejected() {
        assert!(load_suite_items("week9", &[]).is_err());
    }

    #[test]
    fn test_segment_filter() {
        let items = load_suite_items("synthetic", &["hard".to_string()]).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_write_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let items = load_suite_items("synthetic", &[]).unwrap();
        let path = write_manifest(&items, &dir.path().join("run").join("manifest.resolved.json"))
            .unwrap();
        let loaded = crate::eval::harness::load_manifest(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, items[0].id);
    }
}
