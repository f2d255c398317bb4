//! Per-item evaluation harness.
//!
//! Each manifest item runs a five-step pipeline under the dependency-aware
//! runner: resolve data, run the audio pipeline, load the reference, compute
//! metrics, persist them. A failing item produces a zeroed `failed` row and
//! never aborts the batch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::CANONICAL_HOP_S;
use crate::decode::{Segment, State};
use crate::eval::metrics::{
    boundary_f1, framewise_iou, mask_for, micro_ipus_per_min, rapid_alternations,
    speaker_switches_per_min, state_boundaries,
};
use crate::eval::scorecard::ScorecardRow;
use crate::eval::synthetic_cases::materialize_synthetic_case;
use crate::io::{artifacts, textgrid};
use crate::pipeline::{run_pipeline, PipelineOutput, RunOptions};
use crate::runner::{Pipeline, Reporter, RunConfig};

/// One evaluation item from a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestItem {
    pub id: String,
    pub tier: String,
    #[serde(default)]
    pub audio_path: Option<PathBuf>,
    #[serde(default)]
    pub ref_path: Option<PathBuf>,
    #[serde(default)]
    pub scenario: Option<String>,
}

/// Load a manifest (JSON array of items).
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestItem>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid manifest {}", path.display()))
}

/// Rasterize parsed TextGrid tiers into a frame label stream.
///
/// Leak and Overlap tiers take precedence; the per-speaker tiers fill only
/// frames still marked silent.
pub fn segments_to_states(
    tiers: &BTreeMap<String, Vec<Segment>>,
    n_frames: usize,
    hop_s: f64,
) -> Vec<State> {
    let mut states = vec![State::Sil; n_frames];
    let mut paint = |segments: &[Segment], state: State, only_sil: bool| {
        for seg in segments {
            let start = (seg.start_time / hop_s) as usize;
            let end = ((seg.end_time / hop_s) as usize).min(n_frames);
            for frame in states.iter_mut().take(end).skip(start) {
                if !only_sil || *frame == State::Sil {
                    *frame = state;
                }
            }
        }
    };
    if let Some(segs) = tiers.get("Leak") {
        paint(segs, State::Leak, false);
    }
    if let Some(segs) = tiers.get("Overlap") {
        paint(segs, State::Ovl, false);
    }
    if let Some(segs) = tiers.get("SpeakerA") {
        paint(segs, State::A, true);
    }
    if let Some(segs) = tiers.get("SpeakerB") {
        paint(segs, State::B, true);
    }
    states
}

/// Load reference labels from `.json` (array of label strings) or a Praat
/// TextGrid. Other formats fail the item.
pub fn load_reference_states(ref_path: &Path, n_frames: usize, hop_s: f64) -> Result<Vec<State>> {
    let ext = ref_path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "json" => {
            let text = std::fs::read_to_string(ref_path)
                .with_context(|| format!("failed to read reference {}", ref_path.display()))?;
            let labels: Vec<String> = serde_json::from_str(&text)
                .with_context(|| format!("invalid reference {}", ref_path.display()))?;
            labels
                .iter()
                .map(|label| {
                    State::from_label(label)
                        .ok_or_else(|| anyhow!("unknown reference label '{label}'"))
                })
                .collect()
        }
        "textgrid" => {
            let tiers = textgrid::parse_textgrid(ref_path)?;
            Ok(segments_to_states(&tiers, n_frames, hop_s))
        }
        other => bail!(
            "unsupported reference format '.{other}' for {}",
            ref_path.display()
        ),
    }
}

/// Compute the metric row from truncated reference/hypothesis streams.
fn metrics_row(
    item: &ManifestItem,
    ref_states: &[State],
    hyp_states: &[State],
    ipus: &[Segment],
    hop_s: f64,
) -> ScorecardRow {
    let n_frames = ref_states.len().min(hyp_states.len());
    let ref_states = &ref_states[..n_frames];
    let hyp_states = &hyp_states[..n_frames];

    let ref_bounds = state_boundaries(ref_states, hop_s);
    let hyp_bounds = state_boundaries(hyp_states, hop_s);
    let b20 = boundary_f1(&ref_bounds, &hyp_bounds, 0.02);
    let b50 = boundary_f1(&ref_bounds, &hyp_bounds, 0.05);

    let iou_a = framewise_iou(
        &mask_for(ref_states, &[State::A, State::Ovl]),
        &mask_for(hyp_states, &[State::A, State::Ovl]),
    );
    let iou_b = framewise_iou(
        &mask_for(ref_states, &[State::B, State::Ovl]),
        &mask_for(hyp_states, &[State::B, State::Ovl]),
    );
    let iou_any = framewise_iou(
        &mask_for(ref_states, &[State::A, State::B, State::Ovl, State::Leak]),
        &mask_for(hyp_states, &[State::A, State::B, State::Ovl, State::Leak]),
    );

    let total_duration_s = n_frames as f64 * hop_s;
    let micro = micro_ipus_per_min(ipus, total_duration_s);
    let switches = speaker_switches_per_min(hyp_states, hop_s);
    let rapid = rapid_alternations(hyp_states);
    let minutes = (total_duration_s / 60.0).max(1e-9);

    ScorecardRow {
        id: item.id.clone(),
        tier: item.tier.clone(),
        status: "ok".to_string(),
        boundary_f1_20ms: b20.f1,
        boundary_f1_50ms: b50.f1,
        iou_a,
        iou_b,
        iou_any,
        micro_ipus_per_min: micro,
        switches_per_min: switches,
        rapid_alternations: rapid as f64,
        rapid_alternations_per_min: rapid as f64 / minutes,
    }
}

/// Step outputs flowing through the harness pipeline.
enum StepOutput {
    Resolved(ManifestItem),
    Decoded(Box<PipelineOutput>),
    Reference(Vec<State>),
    Metrics(Box<ScorecardRow>),
    Persisted,
}

fn resolved<'a>(results: &'a BTreeMap<String, StepOutput>, step: &str) -> Result<&'a ManifestItem> {
    match results.get(step) {
        Some(StepOutput::Resolved(item)) => Ok(item),
        _ => Err(anyhow!("step '{step}' did not produce a resolved item")),
    }
}

fn decoded<'a>(
    results: &'a BTreeMap<String, StepOutput>,
    step: &str,
) -> Result<&'a PipelineOutput> {
    match results.get(step) {
        Some(StepOutput::Decoded(output)) => Ok(output),
        _ => Err(anyhow!("step '{step}' did not produce decode output")),
    }
}

/// Evaluate one item under the step runner.
///
/// Always returns a row; failures inside any step produce the zeroed
/// `failed` row. The runner summary is written to `pipeline_summary.txt`
/// under the item's out dir.
pub fn evaluate_item(
    item: &ManifestItem,
    out_dir: &Path,
    run_options: &RunOptions,
    run_cfg: &RunConfig,
) -> Result<ScorecardRow> {
    let mut reporter = Reporter::new(run_cfg.clone());
    let mut pipeline: Pipeline<StepOutput> = Pipeline::new();

    let mut context = BTreeMap::new();
    context.insert("item".to_string(), item.id.clone());

    let item_for_resolve = item.clone();
    let synthetic_dir = out_dir.join("_synthetic");
    pipeline.add_with_context("resolve_data", &[], context.clone(), move |_| {
        let resolved = if item_for_resolve.tier == "synthetic"
            && item_for_resolve.audio_path.is_none()
        {
            materialize_synthetic_case(&item_for_resolve, &synthetic_dir)?
        } else {
            item_for_resolve.clone()
        };
        let audio_path = resolved
            .audio_path
            .as_ref()
            .ok_or_else(|| anyhow!("item '{}' has no audio path", resolved.id))?;
        if !audio_path.exists() {
            bail!("audio file not found: {}", audio_path.display());
        }
        if let Some(ref_path) = &resolved.ref_path {
            if !ref_path.exists() {
                bail!("reference file not found: {}", ref_path.display());
            }
        }
        Ok(StepOutput::Resolved(resolved))
    })?;

    let opts = run_options.clone();
    let item_out_dir = out_dir.to_path_buf();
    pipeline.add_with_context(
        "run_pipeline",
        &["resolve_data"],
        context.clone(),
        move |results| {
            let resolved = resolved(results, "resolve_data")?;
            let audio_path = resolved
                .audio_path
                .as_ref()
                .ok_or_else(|| anyhow!("resolved item lost its audio path"))?;
            let output = run_pipeline(audio_path, &item_out_dir, &opts)?;
            Ok(StepOutput::Decoded(Box::new(output)))
        },
    )?;

    pipeline.add_with_context(
        "load_reference",
        &["resolve_data", "run_pipeline"],
        context.clone(),
        move |results| {
            let resolved_item = resolved(results, "resolve_data")?;
            let output = decoded(results, "run_pipeline")?;
            let states = match &resolved_item.ref_path {
                Some(ref_path) => {
                    load_reference_states(ref_path, output.states.len(), CANONICAL_HOP_S)?
                }
                // without a reference the decode is compared to itself
                None => output.states.clone(),
            };
            Ok(StepOutput::Reference(states))
        },
    )?;

    let item_for_metrics = item.clone();
    pipeline.add_with_context(
        "compute_metrics",
        &["run_pipeline", "load_reference"],
        context.clone(),
        move |results| {
            let output = decoded(results, "run_pipeline")?;
            let Some(StepOutput::Reference(ref_states)) = results.get("load_reference") else {
                return Err(anyhow!("missing reference states"));
            };
            let row = metrics_row(
                &item_for_metrics,
                ref_states,
                &output.states,
                &output.ipus,
                CANONICAL_HOP_S,
            );
            Ok(StepOutput::Metrics(Box::new(row)))
        },
    )?;

    let metrics_path = out_dir.join("metrics.json");
    pipeline.add_with_context(
        "write_metrics",
        &["compute_metrics"],
        context,
        move |results| {
            let Some(StepOutput::Metrics(row)) = results.get("compute_metrics") else {
                return Err(anyhow!("missing metrics row"));
            };
            artifacts::save_json(row, &metrics_path)?;
            Ok(StepOutput::Persisted)
        },
    )?;

    let mut results = pipeline.run(&mut reporter)?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    std::fs::write(out_dir.join("pipeline_summary.txt"), reporter.render_summary())
        .with_context(|| format!("failed to write summary under {}", out_dir.display()))?;

    match results.remove("compute_metrics") {
        Some(StepOutput::Metrics(row)) => Ok(*row),
        _ => Ok(ScorecardRow::failed(&item.id, &item.tier)),
    }
}

/// Evaluate every item of a manifest, sorted by (tier, id).
pub fn evaluate_manifest(
    items: &[ManifestItem],
    out_dir: &Path,
    run_options: &RunOptions,
    run_cfg: &RunConfig,
) -> Result<Vec<ScorecardRow>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let mut sorted: Vec<ManifestItem> = items.to_vec();
    sorted.sort_by(|a, b| (a.tier.as_str(), a.id.as_str()).cmp(&(b.tier.as_str(), b.id.as_str())));

    let mut rows = Vec::with_capacity(sorted.len());
    for item in &sorted {
        info!("Evaluating item '{}' (tier {})", item.id, item.tier);
        let row = evaluate_item(item, &out_dir.join(&item.id), run_options, run_cfg)?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_cfg(dir: &Path) -> RunConfig {
        RunConfig {
            write_jsonl: false,
            log_dir: dir.join("logs"),
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_segments_to_states_precedence() {
        let mut tiers: BTreeMap<String, Vec<Segment>> = BTreeMap::new();
        tiers.insert(
            "SpeakerA".to_string(),
            vec![Segment::new(0.0, 0.05, "A")],
        );
        tiers.insert("Leak".to_string(), vec![Segment::new(0.02, 0.04, "LEAK")]);
        let states = segments_to_states(&tiers, 5, 0.01);
        assert_eq!(
            states,
            vec![State::A, State::A, State::Leak, State::Leak, State::A]
        );
    }

    #[test]
    fn test_load_reference_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.json");
        std::fs::write(&path, "[\"SIL\", \"A\", \"OVL\"]").unwrap();
        let states = load_reference_states(&path, 3, 0.01).unwrap();
        assert_eq!(states, vec![State::Sil, State::A, State::Ovl]);
    }

    #[test]
    fn test_load_reference_rejects_npy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.npy");
        std::fs::write(&path, b"\x93NUMPY").unwrap();
        assert!(load_reference_states(&path, 3, 0.01).is_err());
    }

    #[test]
    fn test_missing_audio_produces_failed_row() {
        let dir = tempfile::tempdir().unwrap();
        let item = ManifestItem {
            id: "ghost".to_string(),
            tier: "easy".to_string(),
            audio_path: Some(dir.path().join("missing.wav")),
            ref_path: None,
            scenario: None,
        };
        let row = evaluate_item(
            &item,
            &dir.path().join("ghost"),
            &RunOptions::default(),
            &quiet_cfg(dir.path()),
        )
        .unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.boundary_f1_20ms, 0.0);
        // the runner summary still lands on disk
        assert!(dir.path().join("ghost").join("pipeline_summary.txt").exists());
    }

    #[test]
    fn test_manifest_sorted_by_tier_then_id() {
        let dir = tempfile::tempdir().unwrap();
        let mk = |id: &str, tier: &str| ManifestItem {
            id: id.to_string(),
            tier: tier.to_string(),
            audio_path: Some(dir.path().join("missing.wav")),
            ref_path: None,
            scenario: None,
        };
        // all items fail fast (missing audio) but order must hold
        let rows = evaluate_manifest(
            &[mk("b", "hard"), mk("z", "easy"), mk("a", "hard")],
            dir.path(),
            &RunOptions::default(),
            &quiet_cfg(dir.path()),
        )
        .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "b"]);
    }

    #[test]
    fn test_metrics_row_perfect_match() {
        let item = ManifestItem {
            id: "x".to_string(),
            tier: "easy".to_string(),
            audio_path: None,
            ref_path: None,
            scenario: None,
        };
        let states = vec![State::Sil, State::A, State::A, State::Sil];
        let row = metrics_row(&item, &states, &states, &[], 0.01);
        assert_eq!(row.status, "ok");
        assert_eq!(row.boundary_f1_20ms, 1.0);
        assert_eq!(row.iou_a, 1.0);
        assert_eq!(row.iou_any, 1.0);
    }
}
