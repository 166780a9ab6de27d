//! End-to-end verification run.
//!
//! Toolchain probe → Stage 0 build → Stage 1 build → checks → report. Every
//! step runs sequentially. The [`Workspace`] is created before the first
//! step and torn down exactly once after the last, whether the run
//! completed, failed fatally, or was interrupted.

use std::future::Future;

use crate::artifact::{self, CompilerArtifact};
use crate::checks::CheckRunner;
use crate::config::Config;
use crate::error::Result;
use crate::preflight;
use crate::report::{ReportBuilder, VerificationReport};
use crate::timing::Timer;
use crate::workspace::Workspace;

/// Exit code for a run cut short by an interrupt (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Finished(VerificationReport),
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Finished(report) => report.exit_code(),
            RunOutcome::Interrupted => INTERRUPTED_EXIT_CODE,
        }
    }
}

/// Run the verification, racing it against `interrupt`.
///
/// If `interrupt` resolves first the pipeline is dropped (killing any
/// running child) and teardown still happens before returning.
pub async fn run<F>(config: &Config, interrupt: F) -> RunOutcome
where
    F: Future<Output = ()>,
{
    let mut workspace = Workspace::new(&config.work_root);

    let outcome = tokio::select! {
        report = verify(config, &mut workspace) => RunOutcome::Finished(report),
        _ = interrupt => {
            eprintln!("\n[WARN] Interrupted, cleaning up...");
            RunOutcome::Interrupted
        }
    };

    // Once the verdict is fixed, cleanup problems are only worth a warning.
    if let Err(e) = workspace.teardown() {
        eprintln!("[WARN] Cleanup incomplete: {}", e);
    }
    outcome
}

/// Run every stage and produce the finalized report.
///
/// Fatal errors end the run early and are recorded in the report; they
/// never escape as errors.
pub async fn verify(config: &Config, workspace: &mut Workspace) -> VerificationReport {
    println!("=== Bootstrap Equivalence Verification ===\n");
    let mut report = ReportBuilder::new();

    if let Err(e) = run_stages(config, workspace, &mut report).await {
        eprintln!("\n[FAIL] {}", e);
        report.record_fatal(&e);
    }

    println!();
    report.finalize()
}

async fn run_stages(
    config: &Config,
    workspace: &mut Workspace,
    report: &mut ReportBuilder,
) -> Result<()> {
    println!("Probing toolchain '{}'...", config.toolchain);
    let toolchain = preflight::probe(&config.toolchain)?;
    println!("  found {}", toolchain.display());

    println!("Building Stage 0 with {}...", config.toolchain);
    let timer = Timer::start("Stage 0 build");
    let stage0 = artifact::build_stage0(config, &toolchain, workspace).await?;
    timer.finish();
    describe(&stage0);
    report.record_artifact(&stage0);

    println!("Building Stage 1 with Stage 0...");
    let timer = Timer::start("Stage 1 build");
    let stage1 = artifact::build_stage1(config, &stage0, workspace).await?;
    timer.finish();
    describe(&stage1);
    report.record_artifact(&stage1);

    println!("\nRunning equivalence checks...");
    let timer = Timer::start("Equivalence checks");
    CheckRunner::new(config, &stage0, &stage1)?
        .run(workspace, report)
        .await?;
    timer.finish();
    Ok(())
}

fn describe(artifact: &CompilerArtifact) {
    if artifact.delegated() {
        println!(
            "  {} is a delegation artifact (no self-hosted source); it forwards to Stage 0",
            artifact.stage
        );
    } else {
        println!("  {} sha256 {}", artifact.stage, artifact.short_digest());
    }
    tracing::debug!(stage = %artifact.stage, log = %artifact.build_log, "build log");
}
