//! Content-addressed evidence cache.
//!
//! Producers are deterministic given their inputs, so results are cached on a
//! SHA-1 key derived from the audio file identity (absolute path, size,
//! mtime), the producer name, and its parameters. Writes go through a
//! temporary file and a rename so concurrent runs never observe a partial
//! entry.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha1::{Digest, Sha1};

use super::CoreError;

/// Arrays stored for a cached producer result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedArrays {
    pub values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Vec<f64>>,
}

impl CachedArrays {
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            values,
            confidence: None,
        }
    }
}

/// Build the cache key for a producer run.
///
/// The key covers the resolved audio path, its size and mtime, the producer
/// function name, and the producer parameters. Parameter maps serialize with
/// sorted keys, so logically equal parameter sets hash identically.
pub fn make_cache_key(
    audio_path: &Path,
    func: &str,
    params: &serde_json::Value,
) -> Result<String, CoreError> {
    let meta = fs::metadata(audio_path).map_err(|source| CoreError::CacheIo {
        path: audio_path.to_path_buf(),
        source,
    })?;
    let resolved = fs::canonicalize(audio_path).unwrap_or_else(|_| audio_path.to_path_buf());
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let descriptor = json!({
        "func": func,
        "mtime": mtime,
        "params": params,
        "path": resolved.to_string_lossy(),
        "size": meta.len(),
    });
    let serialized = serde_json::to_string(&descriptor)?;
    let digest = Sha1::digest(serialized.as_bytes());
    Ok(format!("{:x}", digest))
}

fn entry_path(cache_dir: &Path, key: &str) -> PathBuf {
    cache_dir.join(format!("{key}.json"))
}

/// Look up a cached entry. `None` cache dir disables caching entirely.
pub fn cache_get(cache_dir: Option<&Path>, key: &str) -> Option<CachedArrays> {
    let dir = cache_dir?;
    let path = entry_path(dir, key);
    let text = fs::read_to_string(&path).ok()?;
    serde_json::from_str(&text).ok()
}

/// Store a cache entry atomically (temp file + rename).
///
/// Returns the entry path, or `None` when caching is disabled.
pub fn cache_put(
    cache_dir: Option<&Path>,
    key: &str,
    arrays: &CachedArrays,
) -> Result<Option<PathBuf>, CoreError> {
    let Some(dir) = cache_dir else {
        return Ok(None);
    };
    fs::create_dir_all(dir).map_err(|source| CoreError::CacheIo {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = entry_path(dir, key);
    let payload = serde_json::to_vec(arrays)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| CoreError::CacheIo {
        path: dir.to_path_buf(),
        source,
    })?;
    tmp.write_all(&payload).map_err(|source| CoreError::CacheIo {
        path: path.clone(),
        source,
    })?;
    tmp.persist(&path).map_err(|e| CoreError::CacheIo {
        path: path.clone(),
        source: e.error,
    })?;
    Ok(Some(path))
}
