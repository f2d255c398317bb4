//! `dyana eval`: run the evaluation harness and write the scorecard.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::config::{load_config, resolve_out_dir, ConfigError};
use crate::eval::harness::{evaluate_manifest, load_manifest, ManifestItem};
use crate::eval::scorecard::{build_scorecard, write_scorecard};
use crate::eval::suite::{load_suite_items, write_manifest};
use crate::eval::tuning::params_map;
use crate::pipeline::RunOptions;
use crate::runner::RunConfig;

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Evaluation manifest JSON
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Named suite (alternative to --manifest)
    #[arg(long)]
    pub suite: Option<String>,

    /// Subset of tiers when using --suite
    #[arg(long, num_args = 0..)]
    pub segments: Vec<String>,

    /// Output directory root
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Run folder name under out-dir
    #[arg(long, default_value = "current")]
    pub run_name: String,

    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

/// Resolve items from --manifest or --suite; exactly one is required.
pub fn resolve_items(
    manifest: Option<&PathBuf>,
    suite: Option<&str>,
    segments: &[String],
    run_out_dir: &std::path::Path,
) -> Result<Vec<ManifestItem>> {
    if let Some(path) = manifest {
        return load_manifest(path);
    }
    let Some(name) = suite else {
        return Err(ConfigError::MissingArgument("--manifest <path> or --suite <name>".into()).into());
    };
    let items = load_suite_items(name, segments)?;
    write_manifest(&items, &run_out_dir.join("manifest.resolved.json"))?;
    Ok(items)
}

pub fn execute(args: EvalArgs, run_cfg: &RunConfig) -> Result<()> {
    let config = load_config(&std::env::current_dir()?)?;
    let out_dir = resolve_out_dir(config.as_ref(), args.out_dir.clone())?;
    let run_out_dir = out_dir.join(&args.run_name);

    let items = resolve_items(
        args.manifest.as_ref(),
        args.suite.as_deref(),
        &args.segments,
        &run_out_dir,
    )?;

    let options = RunOptions {
        cache_dir: args.cache_dir.clone(),
        ..RunOptions::default()
    };
    let rows = evaluate_manifest(&items, &run_out_dir, &options, run_cfg)?;

    let mut metadata = BTreeMap::new();
    metadata.insert(
        "params".to_string(),
        serde_json::to_value(params_map(&options.tuning))?,
    );
    let scorecard = build_scorecard(rows, metadata);
    write_scorecard(&scorecard, &run_out_dir)?;
    info!(
        "Wrote scorecard for {} item(s) under {}",
        scorecard.results.len(),
        run_out_dir.display()
    );
    Ok(())
}
