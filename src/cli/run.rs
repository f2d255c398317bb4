//! `dyana run`: the end-to-end pipeline on a file or a directory.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::config::{load_config, resolve_out_dir};
use crate::pipeline::{run_pipeline, RunOptions};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Audio file, or a directory containing wav/flac files
    #[arg(long)]
    pub audio: PathBuf,

    /// Output directory (falls back to paths.out_dir in config.yaml)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Cache directory for evidence producers
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Channel index for multi-channel audio (default: mixdown)
    #[arg(long)]
    pub channel: Option<usize>,

    /// VAD aggressiveness (0..3)
    #[arg(long, default_value = "2")]
    pub vad_mode: u8,

    /// Energy smoothing window (ms)
    #[arg(long, default_value = "80.0")]
    pub smooth_ms: f64,

    /// Minimum IPU duration (s)
    #[arg(long, default_value = "0.2")]
    pub min_ipu_s: f64,

    /// Minimum silence duration (s)
    #[arg(long, default_value = "0.02")]
    pub min_sil_s: f64,
}

pub fn execute(args: RunArgs) -> Result<()> {
    let config = load_config(&std::env::current_dir()?)?;
    let out_dir = resolve_out_dir(config.as_ref(), args.out_dir.clone())?;

    let files: Vec<PathBuf> = if args.audio.is_dir() {
        let mut found: Vec<PathBuf> = std::fs::read_dir(&args.audio)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_ascii_lowercase)
                    .map_or(false, |ext| ext == "wav" || ext == "flac")
            })
            .collect();
        found.sort();
        found
    } else {
        vec![args.audio.clone()]
    };

    let options = RunOptions {
        cache_dir: args.cache_dir.clone(),
        channel: args.channel,
        vad_mode: args.vad_mode,
        smooth_ms: args.smooth_ms,
        min_ipu_s: args.min_ipu_s,
        min_sil_s: args.min_sil_s,
        ..RunOptions::default()
    };

    for file in &files {
        let stem = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio")
            .to_string();
        let output = run_pipeline(file, &out_dir.join(&stem), &options)?;
        let summary = &output.summary;
        println!(
            "{}: frames={} ipus A/B/OVL/LEAK={}/{}/{}/{} out={}",
            file.display(),
            summary.n_frames,
            summary.ipu_counts["A"],
            summary.ipu_counts["B"],
            summary.ipu_counts["OVL"],
            summary.ipu_counts["LEAK"],
            summary.out_dir.display()
        );
    }
    info!("Processed {} file(s)", files.len());
    Ok(())
}
