//! `dyana tune`: evaluate with tuning parameters and compare to a baseline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::{load_config, resolve_out_dir, ConfigError};
use crate::decode::DecodeTuningParams;
use crate::eval::harness::evaluate_manifest;
use crate::eval::scorecard::{build_scorecard, read_scorecard, write_scorecard};
use crate::eval::tuning::{
    compute_delta_report, grid_candidates, leaderboard_row, params_map, write_delta_report,
    write_leaderboard, DeltaReport, LeaderboardRow, METRIC_KEYS,
};
use crate::pipeline::RunOptions;
use crate::runner::{PipelineError, RunConfig};

use super::eval::resolve_items;

#[derive(Args, Debug)]
pub struct TuneArgs {
    /// Evaluation manifest JSON
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Named suite (alternative to --manifest)
    #[arg(long)]
    pub suite: Option<String>,

    /// Subset of tiers when using --suite
    #[arg(long, num_args = 0..)]
    pub segments: Vec<String>,

    /// Baseline scorecard JSON path
    #[arg(long)]
    pub baseline: Option<PathBuf>,

    /// Output directory root
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Run folder name under out-dir
    #[arg(long, default_value = "current")]
    pub run_name: String,

    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[arg(long)]
    pub speaker_switch_penalty: Option<f64>,

    #[arg(long)]
    pub leak_entry_bias: Option<f64>,

    #[arg(long)]
    pub ovl_transition_cost: Option<f64>,

    #[arg(long)]
    pub a_to_ovl_cost: Option<f64>,

    #[arg(long)]
    pub b_to_ovl_cost: Option<f64>,

    #[arg(long)]
    pub ovl_to_a_cost: Option<f64>,

    #[arg(long)]
    pub ovl_to_b_cost: Option<f64>,

    /// Evaluate the predefined parameter grid instead of a single candidate
    #[arg(long)]
    pub grid: bool,
}

fn build_params(args: &TuneArgs) -> DecodeTuningParams {
    let defaults = DecodeTuningParams::default();
    DecodeTuningParams {
        speaker_switch_penalty: args
            .speaker_switch_penalty
            .unwrap_or(defaults.speaker_switch_penalty),
        leak_entry_bias: args.leak_entry_bias.unwrap_or(defaults.leak_entry_bias),
        ovl_transition_cost: args
            .ovl_transition_cost
            .unwrap_or(defaults.ovl_transition_cost),
        a_to_ovl_cost: args.a_to_ovl_cost,
        b_to_ovl_cost: args.b_to_ovl_cost,
        ovl_to_a_cost: args.ovl_to_a_cost,
        ovl_to_b_cost: args.ovl_to_b_cost,
    }
}

fn print_summary(report: &DeltaReport) {
    println!("Tune summary:");
    let tier_delta = &report.summary.tier_delta;
    for (tier, metrics) in tier_delta {
        let text = METRIC_KEYS
            .iter()
            .map(|&key| format!("{key}={:+.4}", metrics.get(key).copied().unwrap_or(0.0)))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {tier}: {text}");
    }
    if !report.warnings.is_empty() {
        println!("warnings:");
        for warning in &report.warnings {
            println!("- {warning}");
        }
    }
    if report.failed {
        println!("Guardrails: FAIL ({})", report.failures.join("; "));
    } else {
        println!("Guardrails: PASS");
    }
}

pub fn execute(args: TuneArgs, run_cfg: &RunConfig) -> Result<()> {
    if args.manifest.is_none() && args.suite.is_none() {
        return Err(ConfigError::MissingArgument("--manifest <path> or --suite <name>".into()).into());
    }
    let Some(baseline_path) = args.baseline.clone() else {
        return Err(
            ConfigError::MissingArgument("--baseline <baseline_scorecard.json>".into()).into(),
        );
    };

    let config = load_config(&std::env::current_dir()?)?;
    let out_dir = resolve_out_dir(config.as_ref(), args.out_dir.clone())?;
    let run_out_dir = out_dir.join(&args.run_name);

    let items = resolve_items(
        args.manifest.as_ref(),
        args.suite.as_deref(),
        &args.segments,
        &run_out_dir,
    )?;
    let baseline = read_scorecard(&baseline_path)?;

    let candidates = if args.grid {
        grid_candidates()
    } else {
        vec![build_params(&args)]
    };

    let mut leaderboard: Vec<LeaderboardRow> = Vec::new();
    let mut first_failure: Option<String> = None;

    for (index, params) in candidates.iter().enumerate() {
        let candidate_dir = if candidates.len() == 1 {
            run_out_dir.clone()
        } else {
            run_out_dir.join(format!("candidate_{index:02}"))
        };

        let options = RunOptions {
            cache_dir: args.cache_dir.clone(),
            tuning: *params,
            ..RunOptions::default()
        };
        let rows = evaluate_manifest(&items, &candidate_dir, &options, run_cfg)?;

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "params".to_string(),
            serde_json::to_value(params_map(params))?,
        );
        let scorecard = build_scorecard(rows, metadata);
        write_scorecard(&scorecard, &candidate_dir)?;

        let report =
            compute_delta_report(&baseline, &scorecard, params_map(params), &baseline_path)?;
        write_delta_report(&report, &candidate_dir)?;
        print_summary(&report);

        let candidate_name = candidate_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("current")
            .to_string();
        leaderboard.push(leaderboard_row(&candidate_name, &report));

        if report.failed && first_failure.is_none() {
            let joined = report.failures.join("; ");
            first_failure = Some(if joined.is_empty() {
                "easy-tier guardrail failed".to_string()
            } else {
                joined
            });
        }
    }

    if candidates.len() > 1 {
        write_leaderboard(&leaderboard, &run_out_dir)?;
    }

    if let Some(failure) = first_failure {
        return Err(PipelineError::Guardrail(failure).into());
    }
    Ok(())
}
