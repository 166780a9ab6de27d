//! Stagecheck - bootstrap equivalence verifier.
//!
//! Builds Stage 0 with the trusted toolchain, builds Stage 1 with Stage 0
//! (or a delegation artifact when no self-hosted source exists), runs the
//! version, compilation, runtime and self-diagnostics checks against both,
//! and prints a report ending in PASS or FAIL.

use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use stagecheck::pipeline::{self, RunOutcome};
use stagecheck::{telemetry, Config};

#[derive(Parser)]
#[command(name = "stagecheck")]
#[command(about = "Verify that a self-built Stage 1 compiler matches the trusted Stage 0 build")]
#[command(
    after_help = "CONFIGURATION:\n  Set BOOTSTRAP_* variables in the environment or in .env\n  (BOOTSTRAP_TOOLCHAIN, BOOTSTRAP_TOOLCHAIN_ARGS, BOOTSTRAP_STAGE0_OUTPUT,\n   BOOTSTRAP_SELF_HOSTED_SOURCE, BOOTSTRAP_SAMPLE_PROGRAM, ...)\n\nEXIT CODES:\n  0    PASS (check divergence alone never fails a run)\n  1    FAIL (missing toolchain, failed build, unusable stage)\n  130  interrupted"
)]
struct Cli {
    /// Show configuration, commands and diagnostic output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.verbose);

    let root = std::env::current_dir().context("Failed to determine current directory")?;
    let config = Config::load(&root)?;
    if cli.verbose {
        config.print();
        println!();
    }

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let outcome = pipeline::run(&config, interrupt).await;

    if let RunOutcome::Finished(report) = &outcome {
        report.print();
        if let Some(path) = &config.report_json {
            let json = report.to_json().context("Failed to serialize report")?;
            fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
    }

    Ok(ExitCode::from(outcome.exit_code() as u8))
}
