//! Optional YAML configuration and output-directory resolution.
//!
//! Looks for `config.yaml` then `dyana.yaml` in the working directory. Only
//! the output directory is configurable from file (`paths.out_dir` or
//! `io.out_dir`); a CLI `--out-dir` always wins.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Configuration and argument errors; exit code 2 at the CLI boundary.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no output directory: pass --out-dir or set paths.out_dir in config.yaml")]
    MissingOutDir,

    #[error("missing required argument: {0}")]
    MissingArgument(String),

    #[error("failed to read config {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("malformed config {path}: {message}")]
    Malformed { path: String, message: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsSection {
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
}

/// The recognized subset of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub paths: Option<PathsSection>,
    #[serde(default)]
    pub io: Option<PathsSection>,
}

impl FileConfig {
    /// Output directory from `paths.out_dir`, falling back to `io.out_dir`.
    pub fn out_dir(&self) -> Option<&PathBuf> {
        self.paths
            .as_ref()
            .and_then(|p| p.out_dir.as_ref())
            .or_else(|| self.io.as_ref().and_then(|p| p.out_dir.as_ref()))
    }
}

/// Candidate config file names, in priority order.
const CONFIG_NAMES: [&str; 2] = ["config.yaml", "dyana.yaml"];

/// Load the first config file present in `cwd`, if any.
pub fn load_config(cwd: &Path) -> Result<Option<FileConfig>, ConfigError> {
    for name in CONFIG_NAMES {
        let path = cwd.join(name);
        if !path.exists() {
            continue;
        }
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: FileConfig =
            serde_yaml::from_str(&text).map_err(|e| ConfigError::Malformed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        debug!("loaded config from {}", path.display());
        return Ok(Some(config));
    }
    Ok(None)
}

/// Resolve the output directory: CLI flag first, then config file.
pub fn resolve_out_dir(
    config: Option<&FileConfig>,
    cli_out_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = cli_out_dir {
        return Ok(dir);
    }
    config
        .and_then(FileConfig::out_dir)
        .cloned()
        .ok_or(ConfigError::MissingOutDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_config_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_paths_section_wins_over_io() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "paths:\n  out_dir: from_paths\nio:\n  out_dir: from_io\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.out_dir().unwrap(), &PathBuf::from("from_paths"));
    }

    #[test]
    fn test_io_section_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dyana.yaml"), "io:\n  out_dir: out\n").unwrap();
        let config = load_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.out_dir().unwrap(), &PathBuf::from("out"));
    }

    #[test]
    fn test_config_yaml_preferred_over_dyana_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "paths:\n  out_dir: first\n").unwrap();
        std::fs::write(dir.path().join("dyana.yaml"), "paths:\n  out_dir: second\n").unwrap();
        let config = load_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.out_dir().unwrap(), &PathBuf::from("first"));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), ":[ not yaml").unwrap();
        assert!(matches!(
            load_config(dir.path()),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_resolve_out_dir_cli_wins() {
        let mut config = FileConfig::default();
        config.paths = Some(PathsSection {
            out_dir: Some(PathBuf::from("from_config")),
        });
        let dir = resolve_out_dir(Some(&config), Some(PathBuf::from("from_cli"))).unwrap();
        assert_eq!(dir, PathBuf::from("from_cli"));
    }

    #[test]
    fn test_resolve_out_dir_missing_everywhere() {
        assert!(matches!(
            resolve_out_dir(None, None),
            Err(ConfigError::MissingOutDir)
        ));
    }
}
