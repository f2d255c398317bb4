//! Name-keyed collection of evidence tracks on a shared timebase.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::core::resample::Agg;
use crate::core::{TimeBase, CANONICAL_HOP_S};

use super::{EvidenceError, EvidenceTrack, Semantics, TrackValues};

/// Mutable mapping from track name to `EvidenceTrack`.
///
/// Invariants: every track's hop matches the bundle hop within tolerance, a
/// pinned bundle `n_frames` matches every pinned track length, and (by
/// default) the bundle sits on the canonical 10 ms grid. Adding a duplicate
/// name replaces the previous track. Missing tracks are fine; fusion
/// substitutes neutral defaults.
#[derive(Debug, Clone)]
pub struct EvidenceBundle {
    timebase: TimeBase,
    require_canonical: bool,
    tracks: BTreeMap<String, EvidenceTrack>,
}

impl EvidenceBundle {
    /// Create a bundle that must live on the canonical grid.
    pub fn new(timebase: TimeBase) -> Result<Self, EvidenceError> {
        Self::with_options(timebase, true)
    }

    /// Create a bundle, optionally relaxing the canonical-hop requirement.
    pub fn with_options(timebase: TimeBase, require_canonical: bool) -> Result<Self, EvidenceError> {
        if require_canonical && !timebase.is_canonical() {
            return Err(EvidenceError::NotCanonical {
                expected: CANONICAL_HOP_S,
                got: timebase.hop_s,
            });
        }
        Ok(Self {
            timebase,
            require_canonical,
            tracks: BTreeMap::new(),
        })
    }

    pub fn timebase(&self) -> &TimeBase {
        &self.timebase
    }

    pub fn require_canonical(&self) -> bool {
        self.require_canonical
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn validate_track(&self, track: &EvidenceTrack) -> Result<(), EvidenceError> {
        if !track.timebase().same_hop(&self.timebase) {
            return Err(EvidenceError::HopMismatch {
                name: track.name().to_string(),
                track_hop: track.timebase().hop_s,
                bundle_hop: self.timebase.hop_s,
            });
        }
        if let (Some(bundle_frames), Some(track_frames)) =
            (self.timebase.n_frames, track.timebase().n_frames)
        {
            if bundle_frames != track_frames {
                return Err(EvidenceError::LengthMismatch {
                    name: track.name().to_string(),
                    got: track_frames,
                    expected: bundle_frames,
                });
            }
        }
        if self.require_canonical && !track.timebase().is_canonical() {
            return Err(EvidenceError::NotCanonical {
                expected: CANONICAL_HOP_S,
                got: track.timebase().hop_s,
            });
        }
        Ok(())
    }

    /// Add or replace a track, keyed by its name.
    pub fn add_track(&mut self, track: EvidenceTrack) -> Result<(), EvidenceError> {
        self.validate_track(&track)?;
        self.tracks.insert(track.name().to_string(), track);
        Ok(())
    }

    /// Look up a track by name.
    pub fn get(&self, name: &str) -> Option<&EvidenceTrack> {
        self.tracks.get(name)
    }

    /// Track names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tracks.keys().map(String::as_str)
    }

    /// Iterate tracks in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EvidenceTrack)> {
        self.tracks.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge two bundles; tracks in `other` override duplicates.
    pub fn merge(&self, other: &EvidenceBundle) -> Result<EvidenceBundle, EvidenceError> {
        if !self.timebase.same_hop(&other.timebase) {
            return Err(EvidenceError::MergeHopMismatch {
                left: self.timebase.hop_s,
                right: other.timebase.hop_s,
            });
        }
        let mut merged = EvidenceBundle::with_options(self.timebase, self.require_canonical)?;
        for track in self.tracks.values().chain(other.tracks.values()) {
            merged.add_track(track.clone())?;
        }
        Ok(merged)
    }

    /// Resample every track to `timebase`, returning a new bundle.
    ///
    /// `agg_map` selects per-track aggregation for downsampling;
    /// `default_downsample_agg` covers tracks not named in the map.
    pub fn resample_all_to(
        &self,
        timebase: TimeBase,
        agg_map: &BTreeMap<String, Agg>,
        default_downsample_agg: Option<Agg>,
    ) -> Result<EvidenceBundle, EvidenceError> {
        // The caller chose the target grid explicitly; only keep the
        // canonical requirement when the target actually is canonical.
        let require = self.require_canonical && timebase.is_canonical();
        let mut out = EvidenceBundle::with_options(timebase, require)?;
        for (name, track) in &self.tracks {
            let agg = agg_map.get(name).copied().or(default_downsample_agg);
            out.add_track(track.resample_to(timebase, agg)?)?;
        }
        Ok(out)
    }

    // ---------- Directory serialization ----------

    /// Serialize to a directory: `manifest.json` plus one `<name>.json` per
    /// track.
    pub fn to_directory(&self, path: &Path) -> Result<(), EvidenceError> {
        fs::create_dir_all(path).map_err(|e| EvidenceError::Serialization {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut manifest = BundleManifest {
            timebase: self.timebase,
            tracks: BTreeMap::new(),
        };
        for (name, track) in &self.tracks {
            let file = format!("{name}.json");
            let record = TrackFile::from_track(track);
            let track_path = path.join(&file);
            let text = serde_json::to_string_pretty(&record).map_err(|e| {
                EvidenceError::Serialization {
                    path: track_path.display().to_string(),
                    message: e.to_string(),
                }
            })?;
            fs::write(&track_path, text).map_err(|e| EvidenceError::Serialization {
                path: track_path.display().to_string(),
                message: e.to_string(),
            })?;
            manifest.tracks.insert(name.clone(), file);
        }

        let manifest_path = path.join("manifest.json");
        let text =
            serde_json::to_string_pretty(&manifest).map_err(|e| EvidenceError::Serialization {
                path: manifest_path.display().to_string(),
                message: e.to_string(),
            })?;
        fs::write(&manifest_path, text).map_err(|e| EvidenceError::Serialization {
            path: manifest_path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load a bundle previously written with [`EvidenceBundle::to_directory`].
    pub fn from_directory(path: &Path) -> Result<EvidenceBundle, EvidenceError> {
        let manifest_path = path.join("manifest.json");
        let text = fs::read_to_string(&manifest_path).map_err(|e| EvidenceError::Serialization {
            path: manifest_path.display().to_string(),
            message: e.to_string(),
        })?;
        let manifest: BundleManifest =
            serde_json::from_str(&text).map_err(|e| EvidenceError::Serialization {
                path: manifest_path.display().to_string(),
                message: e.to_string(),
            })?;

        let mut bundle = EvidenceBundle::with_options(manifest.timebase, false)?;
        for (name, file) in &manifest.tracks {
            let track_path = path.join(file);
            let text =
                fs::read_to_string(&track_path).map_err(|e| EvidenceError::Serialization {
                    path: track_path.display().to_string(),
                    message: e.to_string(),
                })?;
            let record: TrackFile =
                serde_json::from_str(&text).map_err(|e| EvidenceError::Serialization {
                    path: track_path.display().to_string(),
                    message: e.to_string(),
                })?;
            let track = record.into_track()?;
            if track.name() != name {
                return Err(EvidenceError::Serialization {
                    path: track_path.display().to_string(),
                    message: format!("manifest names track '{name}' but file holds '{}'", track.name()),
                });
            }
            bundle.add_track(track)?;
        }
        Ok(bundle)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BundleManifest {
    timebase: TimeBase,
    tracks: BTreeMap<String, String>,
}

/// On-disk form of a single evidence track.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrackFile {
    pub name: String,
    pub semantics: Semantics,
    pub timebase: TimeBase,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TrackFile {
    pub fn from_track(track: &EvidenceTrack) -> Self {
        let shape = match track.values() {
            TrackValues::Vector(v) => vec![v.len()],
            TrackValues::Matrix(m) => vec![m.nrows(), m.ncols()],
        };
        Self {
            name: track.name().to_string(),
            semantics: track.semantics(),
            timebase: *track.timebase(),
            shape,
            values: track.values().to_flat_vec(),
            confidence: track.confidence().map(TrackValues::to_flat_vec),
            metadata: track.metadata().clone(),
        }
    }

    pub fn into_track(self) -> Result<EvidenceTrack, EvidenceError> {
        let values = rebuild(&self.shape, self.values, &self.name)?;
        let confidence = match self.confidence {
            Some(flat) => Some(rebuild(&self.shape, flat, &self.name)?),
            None => None,
        };
        EvidenceTrack::with_details(
            self.name,
            self.timebase,
            values,
            self.semantics,
            confidence,
            self.metadata,
        )
    }
}

fn rebuild(shape: &[usize], flat: Vec<f64>, name: &str) -> Result<TrackValues, EvidenceError> {
    match shape {
        [t] => {
            if flat.len() != *t {
                return Err(EvidenceError::Serialization {
                    path: name.to_string(),
                    message: format!("expected {t} values, got {}", flat.len()),
                });
            }
            Ok(TrackValues::Vector(Array1::from_vec(flat)))
        }
        [t, k] => {
            let m = Array2::from_shape_vec((*t, *k), flat).map_err(|e| {
                EvidenceError::Serialization {
                    path: name.to_string(),
                    message: e.to_string(),
                }
            })?;
            Ok(TrackValues::Matrix(m))
        }
        other => Err(EvidenceError::Serialization {
            path: name.to_string(),
            message: format!("unsupported shape {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prob_track(name: &str, values: Vec<f64>) -> EvidenceTrack {
        let tb = TimeBase::canonical_with_frames(values.len());
        EvidenceTrack::new(name, tb, TrackValues::from(values), Semantics::Probability).unwrap()
    }

    #[test]
    fn test_bundle_requires_canonical_by_default() {
        let err = EvidenceBundle::new(TimeBase::new(0.02).unwrap());
        assert!(matches!(err, Err(EvidenceError::NotCanonical { .. })));
        assert!(EvidenceBundle::with_options(TimeBase::new(0.02).unwrap(), false).is_ok());
    }

    #[test]
    fn test_add_and_replace() {
        let mut bundle = EvidenceBundle::new(TimeBase::canonical()).unwrap();
        bundle.add_track(prob_track("vad", vec![0.1, 0.9])).unwrap();
        bundle.add_track(prob_track("vad", vec![0.2, 0.8])).unwrap();
        assert_eq!(bundle.len(), 1);
        let values = bundle.get("vad").unwrap().as_vector().unwrap();
        assert_eq!(values[0], 0.2);
    }

    #[test]
    fn test_hop_mismatch_rejected() {
        let mut bundle = EvidenceBundle::new(TimeBase::canonical()).unwrap();
        let off_grid = EvidenceTrack::new(
            "vad",
            TimeBase::new(0.02).unwrap(),
            TrackValues::from(vec![0.5]),
            Semantics::Probability,
        )
        .unwrap();
        assert!(matches!(
            bundle.add_track(off_grid),
            Err(EvidenceError::HopMismatch { .. })
        ));
    }

    #[test]
    fn test_pinned_length_mismatch_rejected() {
        let mut bundle =
            EvidenceBundle::new(TimeBase::canonical_with_frames(3)).unwrap();
        assert!(matches!(
            bundle.add_track(prob_track("vad", vec![0.5, 0.5])),
            Err(EvidenceError::LengthMismatch { .. })
        ));
        assert!(bundle.add_track(prob_track("vad", vec![0.5, 0.5, 0.5])).is_ok());
    }

    #[test]
    fn test_merge_other_wins() {
        let mut left = EvidenceBundle::new(TimeBase::canonical()).unwrap();
        left.add_track(prob_track("vad", vec![0.1])).unwrap();
        left.add_track(prob_track("diar_a", vec![0.3])).unwrap();

        let mut right = EvidenceBundle::new(TimeBase::canonical()).unwrap();
        right.add_track(prob_track("vad", vec![0.7])).unwrap();

        let merged = left.merge(&right).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("vad").unwrap().as_vector().unwrap()[0], 0.7);
    }

    #[test]
    fn test_directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut bundle = EvidenceBundle::new(TimeBase::canonical()).unwrap();

        let mut metadata = BTreeMap::new();
        metadata.insert("module".to_string(), "vad".to_string());
        let track = EvidenceTrack::with_details(
            "vad",
            TimeBase::canonical_with_frames(3),
            TrackValues::from(vec![0.1, 0.5, 0.9]),
            Semantics::Probability,
            Some(TrackValues::from(vec![1.0, 0.5, 1.0])),
            metadata,
        )
        .unwrap();
        bundle.add_track(track).unwrap();
        bundle.add_track(prob_track("diar_a", vec![0.3, 0.3, 0.3])).unwrap();

        bundle.to_directory(dir.path()).unwrap();
        let loaded = EvidenceBundle::from_directory(dir.path()).unwrap();

        assert_eq!(loaded.len(), 2);
        let vad = loaded.get("vad").unwrap();
        assert_eq!(vad.semantics(), Semantics::Probability);
        assert_eq!(vad.as_vector().unwrap(), bundle.get("vad").unwrap().as_vector().unwrap());
        assert_eq!(vad.metadata().get("module").map(String::as_str), Some("vad"));
        assert!(vad.confidence().is_some());
        assert_eq!(vad.timebase().n_frames, Some(3));
    }

    #[test]
    fn test_resample_all_to() {
        let mut bundle = EvidenceBundle::new(TimeBase::canonical()).unwrap();
        bundle
            .add_track(prob_track("vad", vec![0.0, 1.0, 1.0, 0.0]))
            .unwrap();

        let coarse = TimeBase::new(0.02).unwrap();
        let err = bundle.resample_all_to(coarse, &BTreeMap::new(), None);
        assert!(err.is_err());

        let out = bundle
            .resample_all_to(coarse, &BTreeMap::new(), Some(Agg::Mean))
            .unwrap();
        assert_eq!(out.get("vad").unwrap().num_frames(), 2);
    }
}
