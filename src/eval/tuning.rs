//! Baseline comparison, tier guardrails, and the grid-mode leaderboard.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::decode::DecodeTuningParams;

use super::scorecard::Scorecard;

/// Metrics compared between baseline and current runs.
pub const METRIC_KEYS: [&str; 4] = [
    "boundary_f1_20ms",
    "boundary_f1_50ms",
    "micro_ipus_per_min",
    "switches_per_min",
];

pub const EASY_BOUNDARY_DROP_THRESHOLD: f64 = -0.05;
pub const EASY_SWITCH_INCREASE_FACTOR: f64 = 1.25;
pub const EASY_MICRO_IPU_INCREASE_FACTOR: f64 = 1.25;
pub const SUSPICIOUS_WORSE_FACTOR: f64 = 1.5;

/// Floor applied to baseline rates before ratio checks.
const RATE_FLOOR: f64 = 1e-9;

/// One metric's baseline/current/delta triple.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricDelta {
    pub baseline: f64,
    pub current: f64,
    pub delta: f64,
}

impl MetricDelta {
    fn new(baseline: f64, current: f64) -> Self {
        Self {
            baseline,
            current,
            delta: current - baseline,
        }
    }
}

/// Per-item deltas over the id intersection of the two scorecards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaRow {
    pub id: String,
    pub tier: String,
    pub metrics: BTreeMap<String, MetricDelta>,
}

/// Baseline file identity, recorded for report integrity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineInfo {
    pub path: String,
    pub sha1: String,
    pub mtime: u64,
}

/// Aggregated deltas: overall means and per-tier means.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub overall_delta: BTreeMap<String, f64>,
    pub tier_delta: BTreeMap<String, BTreeMap<String, f64>>,
}

/// The full delta report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaReport {
    pub params: BTreeMap<String, Option<f64>>,
    pub baseline: BaselineInfo,
    pub rows: Vec<DeltaRow>,
    pub summary: DeltaSummary,
    pub failed: bool,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

/// Tuning parameters as the flat map recorded in reports.
pub fn params_map(params: &DecodeTuningParams) -> BTreeMap<String, Option<f64>> {
    let mut map = BTreeMap::new();
    map.insert(
        "speaker_switch_penalty".to_string(),
        Some(params.speaker_switch_penalty),
    );
    map.insert("leak_entry_bias".to_string(), Some(params.leak_entry_bias));
    map.insert(
        "ovl_transition_cost".to_string(),
        Some(params.ovl_transition_cost),
    );
    map.insert("a_to_ovl_cost".to_string(), params.a_to_ovl_cost);
    map.insert("b_to_ovl_cost".to_string(), params.b_to_ovl_cost);
    map.insert("ovl_to_a_cost".to_string(), params.ovl_to_a_cost);
    map.insert("ovl_to_b_cost".to_string(), params.ovl_to_b_cost);
    map
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return 0.0;
    }
    collected.iter().sum::<f64>() / collected.len() as f64
}

/// Compare a current scorecard against a baseline and apply the guardrails.
///
/// Easy-tier items fail the report on a boundary-F1 drop beyond 0.05 or a
/// switch / micro-IPU rate increase beyond 25%. Hard-tier items whose
/// boundary F1 improved while instability worsened by 1.5x or more are
/// flagged as suspicious improvements (warning, not failure).
pub fn compute_delta_report(
    baseline: &Scorecard,
    current: &Scorecard,
    params: BTreeMap<String, Option<f64>>,
    baseline_path: &Path,
) -> Result<DeltaReport> {
    let baseline_by_id: BTreeMap<&str, _> = baseline
        .results
        .iter()
        .map(|r| (r.id.as_str(), r))
        .collect();
    let current_by_id: BTreeMap<&str, _> =
        current.results.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut rows: Vec<DeltaRow> = Vec::new();
    for (&id, current_row) in &current_by_id {
        let Some(baseline_row) = baseline_by_id.get(id) else {
            continue;
        };
        let mut metrics = BTreeMap::new();
        for key in METRIC_KEYS {
            let b = baseline_row.metric(key).unwrap_or(0.0);
            let c = current_row.metric(key).unwrap_or(0.0);
            metrics.insert(key.to_string(), MetricDelta::new(b, c));
        }
        rows.push(DeltaRow {
            id: id.to_string(),
            tier: current_row.tier.clone(),
            metrics,
        });
    }
    rows.sort_by(|a, b| a.id.cmp(&b.id));

    let mut failures = Vec::new();
    let mut warnings = Vec::new();

    for row in rows.iter().filter(|r| r.tier == "easy") {
        let f1_20 = &row.metrics["boundary_f1_20ms"];
        if f1_20.delta < EASY_BOUNDARY_DROP_THRESHOLD {
            failures.push(format!(
                "easy regression: boundary_f1_20ms drop > 0.05 for {}",
                row.id
            ));
        }
        let f1_50 = &row.metrics["boundary_f1_50ms"];
        if f1_50.delta < EASY_BOUNDARY_DROP_THRESHOLD {
            failures.push(format!(
                "easy regression: boundary_f1_50ms drop > 0.05 for {}",
                row.id
            ));
        }
        let switches = &row.metrics["switches_per_min"];
        if switches.current > switches.baseline.max(RATE_FLOOR) * EASY_SWITCH_INCREASE_FACTOR {
            failures.push(format!(
                "easy regression: switches_per_min increase > 25% for {}",
                row.id
            ));
        }
        let micro = &row.metrics["micro_ipus_per_min"];
        if micro.current > micro.baseline.max(RATE_FLOOR) * EASY_MICRO_IPU_INCREASE_FACTOR {
            failures.push(format!(
                "easy regression: micro_ipus_per_min increase > 25% for {}",
                row.id
            ));
        }
    }

    for row in rows.iter().filter(|r| r.tier == "hard") {
        if row.metrics["boundary_f1_20ms"].delta > 0.0 {
            let switches = &row.metrics["switches_per_min"];
            let micro = &row.metrics["micro_ipus_per_min"];
            let switch_worse =
                switches.current > switches.baseline.max(RATE_FLOOR) * SUSPICIOUS_WORSE_FACTOR;
            let micro_worse =
                micro.current > micro.baseline.max(RATE_FLOOR) * SUSPICIOUS_WORSE_FACTOR;
            if switch_worse || micro_worse {
                warnings.push(format!(
                    "suspicious improvement: hard boundary improved but instability worsened for {}",
                    row.id
                ));
            }
        }
    }

    let baseline_bytes = std::fs::read(baseline_path)
        .with_context(|| format!("failed to read baseline {}", baseline_path.display()))?;
    let sha1 = format!("{:x}", Sha1::digest(&baseline_bytes));
    let mtime = std::fs::metadata(baseline_path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let overall_delta = METRIC_KEYS
        .iter()
        .map(|&key| {
            (
                key.to_string(),
                mean(rows.iter().map(|r| r.metrics[key].delta)),
            )
        })
        .collect();
    let mut tier_delta: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    let mut tiers: Vec<String> = rows.iter().map(|r| r.tier.clone()).collect();
    tiers.sort();
    tiers.dedup();
    for tier in tiers {
        let per_metric = METRIC_KEYS
            .iter()
            .map(|&key| {
                (
                    key.to_string(),
                    mean(
                        rows.iter()
                            .filter(|r| r.tier == tier)
                            .map(|r| r.metrics[key].delta),
                    ),
                )
            })
            .collect();
        tier_delta.insert(tier, per_metric);
    }

    let failed = !failures.is_empty();
    Ok(DeltaReport {
        params,
        baseline: BaselineInfo {
            path: baseline_path.display().to_string(),
            sha1,
            mtime,
        },
        rows,
        summary: DeltaSummary {
            overall_delta,
            tier_delta,
        },
        failed,
        failures,
        warnings,
    })
}

/// Write `delta.json` and `delta.csv` under `out_dir`.
pub fn write_delta_report(report: &DeltaReport, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let json_path = out_dir.join("delta.json");
    let text = serde_json::to_string_pretty(report).context("failed to serialize delta report")?;
    std::fs::write(&json_path, text)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    let mut csv = String::from("id,tier");
    for key in METRIC_KEYS {
        let _ = write!(csv, ",{key}_baseline,{key}_current,{key}_delta");
    }
    csv.push('\n');
    for row in &report.rows {
        let _ = write!(csv, "{},{}", row.id, row.tier);
        for key in METRIC_KEYS {
            let m = &row.metrics[key];
            let _ = write!(csv, ",{},{},{}", m.baseline, m.current, m.delta);
        }
        csv.push('\n');
    }
    let csv_path = out_dir.join("delta.csv");
    std::fs::write(&csv_path, csv)
        .with_context(|| format!("failed to write {}", csv_path.display()))
}

// ---------- Grid mode ----------

/// One leaderboard entry per grid candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub candidate: String,
    pub failed: bool,
    pub hard_micro_ipus_per_min_delta: f64,
    pub easy_boundary_f1_20ms_delta: f64,
    pub switches_per_min_delta: f64,
    pub params: BTreeMap<String, Option<f64>>,
}

/// The fixed short list of grid candidates.
pub fn grid_candidates() -> Vec<DecodeTuningParams> {
    vec![
        DecodeTuningParams::new(-6.0, -2.0, -3.0),
        DecodeTuningParams::new(-7.0, -2.0, -3.0),
        DecodeTuningParams::new(-6.0, -2.5, -3.0),
        DecodeTuningParams::new(-7.0, -2.5, -3.5),
    ]
}

/// Build a leaderboard row from a candidate's delta report.
pub fn leaderboard_row(candidate: &str, report: &DeltaReport) -> LeaderboardRow {
    let tier = &report.summary.tier_delta;
    LeaderboardRow {
        candidate: candidate.to_string(),
        failed: report.failed,
        hard_micro_ipus_per_min_delta: tier
            .get("hard")
            .and_then(|m| m.get("micro_ipus_per_min"))
            .copied()
            .unwrap_or(0.0),
        easy_boundary_f1_20ms_delta: tier
            .get("easy")
            .and_then(|m| m.get("boundary_f1_20ms"))
            .copied()
            .unwrap_or(0.0),
        switches_per_min_delta: report
            .summary
            .overall_delta
            .get("switches_per_min")
            .copied()
            .unwrap_or(0.0),
        params: report.params.clone(),
    }
}

/// Sort rows and write `leaderboard.json` / `leaderboard.csv`.
///
/// Order: hard-tier micro-IPU delta ascending, then |easy boundary F1
/// delta|, then overall switch delta.
pub fn write_leaderboard(rows: &[LeaderboardRow], out_dir: &Path) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| {
        let key_a = (
            a.hard_micro_ipus_per_min_delta,
            a.easy_boundary_f1_20ms_delta.abs(),
            a.switches_per_min_delta,
        );
        let key_b = (
            b.hard_micro_ipus_per_min_delta,
            b.easy_boundary_f1_20ms_delta.abs(),
            b.switches_per_min_delta,
        );
        key_a
            .partial_cmp(&key_b)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let json_path = out_dir.join("leaderboard.json");
    let text = serde_json::to_string_pretty(&sorted).context("failed to serialize leaderboard")?;
    std::fs::write(&json_path, text)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    let mut csv = String::from(
        "candidate,failed,hard_micro_ipus_per_min_delta,easy_boundary_f1_20ms_delta,switches_per_min_delta\n",
    );
    for row in &sorted {
        let _ = writeln!(
            csv,
            "{},{},{},{},{}",
            row.candidate,
            row.failed,
            row.hard_micro_ipus_per_min_delta,
            row.easy_boundary_f1_20ms_delta,
            row.switches_per_min_delta
        );
    }
    let csv_path = out_dir.join("leaderboard.csv");
    std::fs::write(&csv_path, csv)
        .with_context(|| format!("failed to write {}", csv_path.display()))
}
