//! Run-scoped error-handling configuration.

use std::path::PathBuf;

/// How step failures propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Record failures, skip dependents, keep going.
    Run,
    /// Stop at the first failure and surface it immediately.
    Debug,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Run => "run",
            RunMode::Debug => "debug",
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" => Ok(RunMode::Run),
            "debug" => Ok(RunMode::Debug),
            other => Err(format!("unknown run mode '{other}'")),
        }
    }
}

/// Configuration for error handling, logging, and the JSONL event stream.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub log_dir: PathBuf,
    /// "auto" generates a fresh short id per run.
    pub run_id: String,
    pub write_jsonl: bool,
    /// Stop scheduling new work once this many steps have failed. Ignored
    /// in debug mode, where the first failure stops the run anyway.
    pub max_failures: Option<usize>,
    /// Prefix for environment overrides, e.g. "DYANA_".
    pub env_prefix: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Run,
            log_dir: PathBuf::from("logs"),
            run_id: "auto".to_string(),
            write_jsonl: true,
            max_failures: None,
            env_prefix: String::new(),
        }
    }
}

impl RunConfig {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Resolve "auto" into a concrete run id.
    pub fn resolved_run_id(&self) -> String {
        if self.run_id != "auto" {
            return self.run_id.clone();
        }
        uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
    }

    /// Apply environment overrides on top of `self`.
    ///
    /// Recognized (with the configured prefix): `ERROR_MODE` (run|debug),
    /// `LOG_DIR`, `WRITE_JSONL` (0/false disable), `MAX_FAILURES`. Invalid
    /// values fall back to the base config rather than failing the run.
    pub fn from_env(&self) -> Self {
        let pfx = &self.env_prefix;
        let mut cfg = self.clone();

        if let Ok(raw) = std::env::var(format!("{pfx}ERROR_MODE")) {
            if let Ok(mode) = raw.parse() {
                cfg.mode = mode;
            }
        }
        if let Ok(raw) = std::env::var(format!("{pfx}LOG_DIR")) {
            if !raw.trim().is_empty() {
                cfg.log_dir = PathBuf::from(raw);
            }
        }
        if let Ok(raw) = std::env::var(format!("{pfx}WRITE_JSONL")) {
            cfg.write_jsonl = !matches!(raw.trim(), "0" | "false" | "False" | "");
        }
        if let Ok(raw) = std::env::var(format!("{pfx}MAX_FAILURES")) {
            if let Ok(n) = raw.trim().parse::<usize>() {
                cfg.max_failures = Some(n);
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_run_id_explicit() {
        let cfg = RunConfig {
            run_id: "myrun".to_string(),
            ..RunConfig::default()
        };
        assert_eq!(cfg.resolved_run_id(), "myrun");
    }

    #[test]
    fn test_resolved_run_id_auto_is_fresh() {
        let cfg = RunConfig::default();
        let a = cfg.resolved_run_id();
        let b = cfg.resolved_run_id();
        assert_eq!(a.len(), 10);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_env_reads_overrides() {
        // prefixed so the test cannot collide with a real environment
        std::env::set_var("DYTEST_ERROR_MODE", "debug");
        std::env::set_var("DYTEST_WRITE_JSONL", "0");
        std::env::set_var("DYTEST_MAX_FAILURES", "7");

        let cfg = RunConfig::with_prefix("DYTEST_").from_env();
        assert_eq!(cfg.mode, RunMode::Debug);
        assert!(!cfg.write_jsonl);
        assert_eq!(cfg.max_failures, Some(7));

        std::env::remove_var("DYTEST_ERROR_MODE");
        std::env::remove_var("DYTEST_WRITE_JSONL");
        std::env::remove_var("DYTEST_MAX_FAILURES");
    }

    #[test]
    fn test_from_env_invalid_values_fall_back() {
        std::env::set_var("DYTEST2_ERROR_MODE", "nonsense");
        std::env::set_var("DYTEST2_MAX_FAILURES", "abc");
        std::env::set_var("DYTEST2_WRITE_JSONL", "maybe");

        let cfg = RunConfig::with_prefix("DYTEST2_").from_env();
        assert_eq!(cfg.mode, RunMode::Run);
        assert_eq!(cfg.max_failures, None);
        // "maybe" is not a recognized falsy value, so it stays enabled
        assert!(cfg.write_jsonl);

        std::env::remove_var("DYTEST2_ERROR_MODE");
        std::env::remove_var("DYTEST2_MAX_FAILURES");
        std::env::remove_var("DYTEST2_WRITE_JSONL");
    }
}
