//! Structured JSONL event stream.
//!
//! One JSON object per line, append-only, alongside the human-readable log.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

/// A single event line.
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    pub time_utc: String,
    pub run_id: &'a str,
    pub event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<&'a str>,
    pub level: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<&'a BTreeMap<String, String>>,
}

/// Appends structured events as JSON lines.
#[derive(Debug, Clone)]
pub struct JsonlEventLogger {
    path: PathBuf,
    run_id: String,
}

impl JsonlEventLogger {
    pub fn new(path: PathBuf, run_id: String) -> Self {
        Self { path, run_id }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Write one event. Failures are logged and swallowed; the event stream
    /// must never take the run down.
    pub fn write(
        &self,
        event: &str,
        step: Option<&str>,
        level: &str,
        message: Option<&str>,
        context: Option<&BTreeMap<String, String>>,
    ) {
        let record = EventRecord {
            time_utc: Utc::now().to_rfc3339(),
            run_id: &self.run_id,
            event,
            step,
            level,
            message,
            context,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize event '{event}': {e}");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            warn!("failed to append event to {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events_test.jsonl");
        let logger = JsonlEventLogger::new(path.clone(), "run123".to_string());

        logger.write("step_ok", Some("load"), "INFO", None, None);
        let mut context = BTreeMap::new();
        context.insert("item".to_string(), "case-1".to_string());
        logger.write(
            "step_failed",
            Some("decode"),
            "ERROR",
            Some("boom"),
            Some(&context),
        );

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "step_ok");
        assert_eq!(first["run_id"], "run123");
        assert_eq!(first["step"], "load");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["message"], "boom");
        assert_eq!(second["context"]["item"], "case-1");
    }
}
