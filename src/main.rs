use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use dyana::cli::{eval, run, tune};
use dyana::config::ConfigError;
use dyana::runner::RunConfig;

/// Turn-taking analysis for two-party conversational audio
#[derive(Parser, Debug)]
#[command(name = "dyana", version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline end-to-end on a file or directory
    Run(run::RunArgs),
    /// Run the evaluation harness and write a scorecard
    Eval(eval::EvalArgs),
    /// Evaluate with tuning parameters and compare to a baseline
    Tune(tune::TuneArgs),
    /// Reserved: run only decoding
    Decode,
    /// Reserved: run evidence-only diagnostics
    Evidence,
    /// Reserved: run iterative refinement only
    Iterate,
}

fn dispatch(cli: Cli, run_cfg: &RunConfig) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run::execute(args),
        Commands::Eval(args) => eval::execute(args, run_cfg),
        Commands::Tune(args) => tune::execute(args, run_cfg),
        Commands::Decode | Commands::Evidence | Commands::Iterate => Ok(()),
    }
}

fn exit_code_for(error: &anyhow::Error) -> i32 {
    // configuration problems exit 2; guardrail and runtime failures exit 1
    if error.downcast_ref::<ConfigError>().is_some() {
        2
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    let mut run_cfg = RunConfig::with_prefix("DYANA_").from_env();
    // pin the run id so the log file and the event stream agree
    run_cfg.run_id = run_cfg.resolved_run_id();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let _ = std::fs::create_dir_all(&run_cfg.log_dir);
    let file_appender = tracing_appender::rolling::never(
        &run_cfg.log_dir,
        format!("run_{}.log", run_cfg.run_id),
    );
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    if let Err(e) = dispatch(cli, &run_cfg) {
        error!("{e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(exit_code_for(&e));
    }
}
