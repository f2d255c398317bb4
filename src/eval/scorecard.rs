//! Scorecard rows, aggregation, and JSON/CSV persistence.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Metric keys aggregated into summary means, in column order.
pub const METRIC_FIELDS: [&str; 9] = [
    "boundary_f1_20ms",
    "boundary_f1_50ms",
    "iou_a",
    "iou_b",
    "iou_any",
    "micro_ipus_per_min",
    "switches_per_min",
    "rapid_alternations",
    "rapid_alternations_per_min",
];

/// Per-item evaluation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorecardRow {
    pub id: String,
    pub tier: String,
    pub status: String,
    pub boundary_f1_20ms: f64,
    pub boundary_f1_50ms: f64,
    pub iou_a: f64,
    pub iou_b: f64,
    pub iou_any: f64,
    pub micro_ipus_per_min: f64,
    pub switches_per_min: f64,
    pub rapid_alternations: f64,
    pub rapid_alternations_per_min: f64,
}

impl ScorecardRow {
    /// A zeroed row for an item whose evaluation failed.
    pub fn failed(id: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tier: tier.into(),
            status: "failed".to_string(),
            boundary_f1_20ms: 0.0,
            boundary_f1_50ms: 0.0,
            iou_a: 0.0,
            iou_b: 0.0,
            iou_any: 0.0,
            micro_ipus_per_min: 0.0,
            switches_per_min: 0.0,
            rapid_alternations: 0.0,
            rapid_alternations_per_min: 0.0,
        }
    }

    /// Metric values in [`METRIC_FIELDS`] order.
    pub fn metric_values(&self) -> [f64; 9] {
        [
            self.boundary_f1_20ms,
            self.boundary_f1_50ms,
            self.iou_a,
            self.iou_b,
            self.iou_any,
            self.micro_ipus_per_min,
            self.switches_per_min,
            self.rapid_alternations,
            self.rapid_alternations_per_min,
        ]
    }

    /// Metric by key, for the delta computation.
    pub fn metric(&self, key: &str) -> Option<f64> {
        METRIC_FIELDS
            .iter()
            .position(|&k| k == key)
            .map(|i| self.metric_values()[i])
    }
}

/// Full scorecard document: rows plus aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scorecard {
    pub results: Vec<ScorecardRow>,
    pub summary: BTreeMap<String, f64>,
    pub by_tier: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Mean of every metric field over `rows`.
pub fn aggregate(rows: &[ScorecardRow]) -> BTreeMap<String, f64> {
    let mut summary = BTreeMap::new();
    if rows.is_empty() {
        return summary;
    }
    for (i, &key) in METRIC_FIELDS.iter().enumerate() {
        let sum: f64 = rows.iter().map(|r| r.metric_values()[i]).sum();
        summary.insert(key.to_string(), sum / rows.len() as f64);
    }
    summary
}

/// Per-tier means of every metric field.
pub fn aggregate_by_tier(rows: &[ScorecardRow]) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut grouped: BTreeMap<String, Vec<ScorecardRow>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.tier.clone()).or_default().push(row.clone());
    }
    grouped
        .into_iter()
        .map(|(tier, rows)| (tier, aggregate(&rows)))
        .collect()
}

/// Assemble a scorecard document from rows and optional metadata.
pub fn build_scorecard(
    rows: Vec<ScorecardRow>,
    metadata: BTreeMap<String, serde_json::Value>,
) -> Scorecard {
    let summary = aggregate(&rows);
    let by_tier = aggregate_by_tier(&rows);
    Scorecard {
        results: rows,
        summary,
        by_tier,
        metadata,
    }
}

/// Write `scorecard.json` and `scorecard.csv` under `out_dir`.
pub fn write_scorecard(scorecard: &Scorecard, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let json_path = out_dir.join("scorecard.json");
    let text = serde_json::to_string_pretty(scorecard).context("failed to serialize scorecard")?;
    std::fs::write(&json_path, text)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    let mut csv = String::from("id,tier,status");
    for key in METRIC_FIELDS {
        let _ = write!(csv, ",{key}");
    }
    csv.push('\n');
    for row in &scorecard.results {
        let _ = write!(csv, "{},{},{}", row.id, row.tier, row.status);
        for value in row.metric_values() {
            let _ = write!(csv, ",{value}");
        }
        csv.push('\n');
    }
    let csv_path = out_dir.join("scorecard.csv");
    std::fs::write(&csv_path, csv)
        .with_context(|| format!("failed to write {}", csv_path.display()))
}

/// Read a scorecard JSON document.
pub fn read_scorecard(path: &Path) -> Result<Scorecard> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scorecard {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid scorecard {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, tier: &str, f1: f64, switches: f64) -> ScorecardRow {
        ScorecardRow {
            boundary_f1_20ms: f1,
            boundary_f1_50ms: f1,
            switches_per_min: switches,
            ..ScorecardRow::failed(id, tier)
        }
    }

    #[test]
    fn test_aggregate_means() {
        let rows = vec![row("a", "easy", 0.8, 2.0), row("b", "easy", 0.6, 4.0)];
        let summary = aggregate(&rows);
        assert!((summary["boundary_f1_20ms"] - 0.7).abs() < 1e-12);
        assert!((summary["switches_per_min"] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn test_aggregate_by_tier_partitions() {
        let rows = vec![
            row("a", "easy", 0.8, 0.0),
            row("b", "hard", 0.4, 0.0),
            row("c", "easy", 0.6, 0.0),
        ];
        let by_tier = aggregate_by_tier(&rows);
        assert!((by_tier["easy"]["boundary_f1_20ms"] - 0.7).abs() < 1e-12);
        assert!((by_tier["hard"]["boundary_f1_20ms"] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_write_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "params".to_string(),
            serde_json::json!({"speaker_switch_penalty": -6.0}),
        );
        let card = build_scorecard(vec![row("a", "easy", 0.9, 1.0)], metadata);
        write_scorecard(&card, dir.path()).unwrap();

        let loaded = read_scorecard(&dir.path().join("scorecard.json")).unwrap();
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.results[0].id, "a");
        assert!((loaded.summary["boundary_f1_20ms"] - 0.9).abs() < 1e-12);
        assert_eq!(loaded.metadata["params"]["speaker_switch_penalty"], -6.0);

        let csv = std::fs::read_to_string(dir.path().join("scorecard.csv")).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("id,tier,status,boundary_f1_20ms"));
        assert!(lines.next().unwrap().starts_with("a,easy,failed,0.9"));
    }
}
