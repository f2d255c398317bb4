//! Step-outcome bookkeeping and end-of-run summaries.
//!
//! The reporter is the single source of truth for what happened in a run.
//! The pipeline and step wrappers report here; they never decide formatting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::config::RunConfig;
use super::events::JsonlEventLogger;

/// Status of a named step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Ok => "ok",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// Structured record of a failure or skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub step_name: String,
    pub status: StepStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

/// Collects step outcomes and renders the run summary.
#[derive(Debug)]
pub struct Reporter {
    cfg: RunConfig,
    run_id: String,
    records: Vec<FailureRecord>,
    status: BTreeMap<String, StepStatus>,
    event_logger: Option<JsonlEventLogger>,
}

impl Reporter {
    pub fn new(cfg: RunConfig) -> Self {
        let run_id = cfg.resolved_run_id();
        let event_logger = if cfg.write_jsonl {
            Some(JsonlEventLogger::new(
                cfg.log_dir.join(format!("events_{run_id}.jsonl")),
                run_id.clone(),
            ))
        } else {
            None
        };
        Self {
            cfg,
            run_id,
            records: Vec::new(),
            status: BTreeMap::new(),
            event_logger,
        }
    }

    pub fn cfg(&self) -> &RunConfig {
        &self.cfg
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn status(&self, step_name: &str) -> Option<StepStatus> {
        self.status.get(step_name).copied()
    }

    pub fn ok(&self, step_name: &str) -> bool {
        self.status(step_name) == Some(StepStatus::Ok)
    }

    pub fn failed(&self, step_name: &str) -> bool {
        self.status(step_name) == Some(StepStatus::Failed)
    }

    pub fn skipped(&self, step_name: &str) -> bool {
        self.status(step_name) == Some(StepStatus::Skipped)
    }

    pub fn failures_count(&self) -> usize {
        self.status
            .values()
            .filter(|&&s| s == StepStatus::Failed)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failures_count() > 0
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    /// Record a successful step.
    pub fn mark_ok(&mut self, step_name: &str) {
        self.status.insert(step_name.to_string(), StepStatus::Ok);
        if let Some(events) = &self.event_logger {
            events.write("step_ok", Some(step_name), "INFO", None, None);
        }
    }

    /// Record a skipped step and the dependency that caused it.
    pub fn mark_skipped(
        &mut self,
        step_name: &str,
        caused_by: &str,
        context: &BTreeMap<String, String>,
    ) {
        self.status
            .insert(step_name.to_string(), StepStatus::Skipped);
        let message =
            format!("Skipped because dependency '{caused_by}' failed or was skipped.");
        warn!(step = step_name, caused_by, "skipping step");
        if let Some(events) = &self.event_logger {
            events.write(
                "step_skipped",
                Some(step_name),
                "WARNING",
                Some(&message),
                Some(context),
            );
        }
        self.records.push(FailureRecord {
            step_name: step_name.to_string(),
            status: StepStatus::Skipped,
            message,
            caused_by: Some(caused_by.to_string()),
            context: context.clone(),
        });
    }

    /// Record a failed step with its error message.
    pub fn mark_failed(
        &mut self,
        step_name: &str,
        error: &anyhow::Error,
        context: &BTreeMap<String, String>,
    ) {
        self.status
            .insert(step_name.to_string(), StepStatus::Failed);
        let message = format!("{error:#}");
        error!(step = step_name, "step failed: {message}");
        if let Some(events) = &self.event_logger {
            events.write(
                "step_failed",
                Some(step_name),
                "ERROR",
                Some(&message),
                Some(context),
            );
        }
        self.records.push(FailureRecord {
            step_name: step_name.to_string(),
            status: StepStatus::Failed,
            message,
            caused_by: None,
            context: context.clone(),
        });
    }

    /// Human-readable run summary: counts, per-step reasons, artifact paths.
    pub fn render_summary(&self) -> String {
        let ok_n = self.status.values().filter(|&&s| s == StepStatus::Ok).count();
        let fail_n = self.failures_count();
        let skip_n = self
            .status
            .values()
            .filter(|&&s| s == StepStatus::Skipped)
            .count();

        let mut lines = vec![
            format!(
                "Run summary (run_id={}, mode={})",
                self.run_id,
                self.cfg.mode.as_str()
            ),
            format!("  OK:   {ok_n}"),
            format!("  FAIL: {fail_n}"),
            format!("  SKIP: {skip_n}"),
        ];

        if fail_n + skip_n == 0 {
            return lines.join("\n");
        }

        lines.push(String::new());
        lines.push("Details:".to_string());
        for rec in &self.records {
            match rec.status {
                StepStatus::Failed => {
                    lines.push(format!("  - FAIL {}: {}", rec.step_name, rec.message));
                }
                _ => {
                    lines.push(format!("  - SKIP {}: {}", rec.step_name, rec.message));
                }
            }
        }

        lines.push(String::new());
        lines.push("Artifacts:".to_string());
        lines.push(format!(
            "  - {}",
            self.cfg
                .log_dir
                .join(format!("run_{}.log", self.run_id))
                .display()
        ));
        if let Some(events) = &self.event_logger {
            lines.push(format!("  - {}", events.path().display()));
        }
        lines.join("\n")
    }

    /// Conventional process exit code: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn quiet_cfg() -> RunConfig {
        RunConfig {
            write_jsonl: false,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_status_tracking() {
        let mut reporter = Reporter::new(quiet_cfg());
        reporter.mark_ok("load");
        reporter.mark_failed("parse", &anyhow!("boom"), &BTreeMap::new());
        reporter.mark_skipped("fit", "parse", &BTreeMap::new());

        assert!(reporter.ok("load"));
        assert!(reporter.failed("parse"));
        assert!(reporter.skipped("fit"));
        assert_eq!(reporter.status("unknown"), None);
        assert_eq!(reporter.failures_count(), 1);
        assert!(reporter.has_failures());
        assert_eq!(reporter.exit_code(), 1);
    }

    #[test]
    fn test_summary_counts_and_details() {
        let mut reporter = Reporter::new(quiet_cfg());
        reporter.mark_ok("a");
        reporter.mark_failed("b", &anyhow!("kaput"), &BTreeMap::new());
        reporter.mark_skipped("c", "b", &BTreeMap::new());

        let summary = reporter.render_summary();
        assert!(summary.contains("OK:   1"));
        assert!(summary.contains("FAIL: 1"));
        assert!(summary.contains("SKIP: 1"));
        assert!(summary.contains("FAIL b: kaput"));
        assert!(summary.contains("caused_by") || summary.contains("dependency 'b'"));
    }

    #[test]
    fn test_clean_run_summary_is_short() {
        let mut reporter = Reporter::new(quiet_cfg());
        reporter.mark_ok("only");
        let summary = reporter.render_summary();
        assert!(!summary.contains("Details:"));
        assert_eq!(reporter.exit_code(), 0);
    }

    #[test]
    fn test_events_written_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig {
            log_dir: dir.path().to_path_buf(),
            run_id: "evrun".to_string(),
            ..RunConfig::default()
        };
        let mut reporter = Reporter::new(cfg);
        reporter.mark_ok("step1");
        let events_path = dir.path().join("events_evrun.jsonl");
        let text = std::fs::read_to_string(events_path).unwrap();
        assert!(text.contains("step_ok"));
    }
}
