//! The audio-to-labels run path.
//!
//! Producers feed an `EvidenceBundle` on the canonical grid, fusion turns it
//! into per-state log-scores, the constrained decoder yields the label
//! stream, and IPU extraction plus the artifact writers produce the on-disk
//! tree for one audio file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::{TimeBase, CANONICAL_HOP_S};
use crate::decode::constraints::MinDurations;
use crate::decode::decoder::{
    decode_diagnostics, decode_with_constraints, DecodeDiagnostics, DecodeOptions,
};
use crate::decode::fusion::fuse_bundle_to_scores;
use crate::decode::ipu::{extract_ipus, Segment};
use crate::decode::{DecodeTuningParams, State};
use crate::evidence::energy::{
    compute_energy_rms_track, compute_energy_slope_track, compute_energy_smooth_track,
    SMOOTH_MS_DEFAULT,
};
use crate::evidence::leakage::compute_leakage_likelihood;
use crate::evidence::prosody::compute_voiced_soft_track;
use crate::evidence::vad::compute_vad_soft_track;
use crate::evidence::{EvidenceBundle, EvidenceTrack, TrackValues};
use crate::io::{artifacts, audio, textgrid};

/// Options for a single pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub cache_dir: Option<PathBuf>,
    pub channel: Option<usize>,
    pub vad_mode: u8,
    pub smooth_ms: f64,
    pub min_ipu_s: f64,
    pub min_sil_s: f64,
    pub tuning: DecodeTuningParams,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cache_dir: None,
            channel: None,
            vad_mode: 2,
            smooth_ms: SMOOTH_MS_DEFAULT,
            min_ipu_s: 0.2,
            min_sil_s: 0.02,
            tuning: DecodeTuningParams::default(),
        }
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub audio: PathBuf,
    pub hop_s: f64,
    pub n_frames: usize,
    pub ipu_counts: BTreeMap<String, usize>,
    pub out_dir: PathBuf,
}

/// Full in-memory output of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub states: Vec<State>,
    /// Decoded IPUs across A, B, OVL, LEAK, in that label order.
    pub ipus: Vec<Segment>,
    pub diagnostics: DecodeDiagnostics,
    pub summary: RunSummary,
}

/// Truncate a track to `n_frames` so producers with ceil/floor length
/// differences land on one bundle length.
fn truncate_track(track: &EvidenceTrack, n_frames: usize) -> Result<EvidenceTrack> {
    if track.num_frames() == n_frames {
        return Ok(track.clone());
    }
    let values = match track.values() {
        TrackValues::Vector(v) => {
            TrackValues::Vector(v.slice(ndarray::s![..n_frames]).to_owned())
        }
        TrackValues::Matrix(m) => {
            TrackValues::Matrix(m.slice(ndarray::s![..n_frames, ..]).to_owned())
        }
    };
    Ok(EvidenceTrack::with_details(
        track.name().to_string(),
        TimeBase::canonical_with_frames(n_frames),
        values,
        track.semantics(),
        None,
        track.metadata().clone(),
    )?)
}

/// Run the full pipeline on one audio file, writing the artifact tree under
/// `out_dir`.
pub fn run_pipeline(audio_path: &Path, out_dir: &Path, opts: &RunOptions) -> Result<PipelineOutput> {
    let stem = audio_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio")
        .to_string();
    info!("Running pipeline on {}", audio_path.display());

    let cache_dir = opts.cache_dir.as_deref();
    let energy_rms = compute_energy_rms_track(audio_path, opts.channel, cache_dir)?;
    let energy_smooth =
        compute_energy_smooth_track(audio_path, opts.channel, opts.smooth_ms, cache_dir)?;
    let energy_slope =
        compute_energy_slope_track(audio_path, opts.channel, opts.smooth_ms, cache_dir)?;
    let vad_soft = compute_vad_soft_track(audio_path, opts.vad_mode, cache_dir)?;
    let voiced_soft = compute_voiced_soft_track(audio_path, opts.vad_mode, cache_dir)?;

    let mut tracks = vec![energy_rms, energy_smooth, energy_slope, vad_soft, voiced_soft];

    // Leakage needs two channels; mono files simply go without it.
    let loaded = audio::load_audio(audio_path)?;
    if loaded.num_channels() >= 2 {
        tracks.push(compute_leakage_likelihood(audio_path, cache_dir)?);
    } else {
        debug!("mono input, skipping leakage evidence");
    }

    // Producers disagree by at most one frame at the file tail (ceil vs
    // floor framing); align on the shortest.
    let n_frames = tracks
        .iter()
        .map(EvidenceTrack::num_frames)
        .min()
        .context("no evidence tracks produced")?;
    let tb = TimeBase::canonical_with_frames(n_frames);
    let mut bundle = EvidenceBundle::new(tb)?;
    for track in &tracks {
        bundle.add_track(truncate_track(track, n_frames)?)?;
    }

    let scores = fuse_bundle_to_scores(&bundle)?;
    let min_sil_frames = ((opts.min_sil_s / CANONICAL_HOP_S).round() as usize).max(1);
    let decode_options = DecodeOptions {
        min_durations: MinDurations {
            sil: min_sil_frames,
            ..MinDurations::default()
        },
        tuning: opts.tuning,
        transition: None,
        initial: None,
    };
    let states = decode_with_constraints(&scores, &decode_options)?;
    let diagnostics = decode_diagnostics(&states);
    if diagnostics.ipu_start_after_leak_count > 0 {
        warn!(
            "decoded {} IPU start(s) directly after leak",
            diagnostics.ipu_start_after_leak_count
        );
    }

    let ipus_a = extract_ipus(&states, &tb, State::A, opts.min_ipu_s);
    let ipus_b = extract_ipus(&states, &tb, State::B, opts.min_ipu_s);
    let ipus_ovl = extract_ipus(&states, &tb, State::Ovl, opts.min_ipu_s);
    let ipus_leak = extract_ipus(&states, &tb, State::Leak, opts.min_ipu_s);

    // ---------- Artifacts ----------
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let evidence_dir = out_dir.join("evidence");
    let decode_dir = out_dir.join("decode");
    for (name, track) in bundle.iter() {
        artifacts::save_evidence_track(track, &evidence_dir.join(format!("{stem}_{name}.json")))?;
    }
    artifacts::save_states(&states, &decode_dir.join(format!("{stem}_states.json")))?;

    let mut all_ipus = Vec::new();
    all_ipus.extend(ipus_a.iter().cloned());
    all_ipus.extend(ipus_b.iter().cloned());
    all_ipus.extend(ipus_ovl.iter().cloned());
    all_ipus.extend(ipus_leak.iter().cloned());
    artifacts::save_json(&all_ipus, &decode_dir.join(format!("{stem}_ipus.json")))?;
    artifacts::dump_diagnostics(out_dir, &stem, &diagnostics)?;

    textgrid::write_textgrid(
        &out_dir.join(format!("{stem}.TextGrid")),
        &ipus_a,
        &ipus_b,
        &ipus_ovl,
        &ipus_leak,
    )?;

    let mut ipu_counts = BTreeMap::new();
    ipu_counts.insert("A".to_string(), ipus_a.len());
    ipu_counts.insert("B".to_string(), ipus_b.len());
    ipu_counts.insert("OVL".to_string(), ipus_ovl.len());
    ipu_counts.insert("LEAK".to_string(), ipus_leak.len());

    info!(
        "Decoded {} frames: {} A / {} B / {} OVL / {} LEAK IPUs",
        states.len(),
        ipu_counts["A"],
        ipu_counts["B"],
        ipu_counts["OVL"],
        ipu_counts["LEAK"]
    );

    Ok(PipelineOutput {
        states,
        ipus: all_ipus,
        diagnostics,
        summary: RunSummary {
            audio: audio_path.to_path_buf(),
            hop_s: CANONICAL_HOP_S,
            n_frames,
            ipu_counts,
            out_dir: out_dir.to_path_buf(),
        },
    })
}
