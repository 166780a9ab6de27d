//! Equivalence checks.
//!
//! Runs the four checks strictly in order against both artifacts:
//!
//! | check            | invocation                  | compared                 |
//! |------------------|-----------------------------|--------------------------|
//! | version          | `<cc> --version`            | stdout                   |
//! | compilation      | `<cc> <sample> -o sample`   | exit status, stdout, stderr |
//! | runtime          | `./sample`                  | stdout                   |
//! | self-diagnostics | `<cc> --self-check`         | exit status, stdout      |
//!
//! Each check is independent and never retried. Divergence is recorded and
//! the run continues. The only fatal outcome is a stage that cannot be
//! started at all during the version check.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::artifact::{CompilerArtifact, Stage};
use crate::compare::{self, Stream};
use crate::config::Config;
use crate::error::{Result, VerifyError};
use crate::process::{Cmd, Invocation, InvocationFailure};
use crate::report::{ComparisonResult, ReportBuilder};
use crate::workspace::Workspace;

/// File name of the compiled sample inside each stage's sample directory.
pub const SAMPLE_BINARY: &str = "sample";

/// One equivalence check. Order matters: runtime consumes what
/// compilation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Version,
    Compilation,
    Runtime,
    SelfDiagnostics,
}

impl CheckKind {
    /// All checks, in execution order.
    pub const ALL: [CheckKind; 4] = [
        CheckKind::Version,
        CheckKind::Compilation,
        CheckKind::Runtime,
        CheckKind::SelfDiagnostics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CheckKind::Version => "version",
            CheckKind::Compilation => "compilation",
            CheckKind::Runtime => "runtime",
            CheckKind::SelfDiagnostics => "self-diagnostics",
        }
    }

    /// The part of the output this check compares.
    pub fn stream(self) -> Stream {
        match self {
            CheckKind::Version | CheckKind::Runtime => Stream::Stdout,
            CheckKind::Compilation => Stream::StatusAndLog,
            CheckKind::SelfDiagnostics => Stream::StatusAndStdout,
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Drives both artifacts through every check.
pub struct CheckRunner<'a> {
    config: &'a Config,
    stage0: &'a CompilerArtifact,
    stage1: &'a CompilerArtifact,
}

impl<'a> CheckRunner<'a> {
    /// Refuses to start unless both artifacts are on disk.
    pub fn new(
        config: &'a Config,
        stage0: &'a CompilerArtifact,
        stage1: &'a CompilerArtifact,
    ) -> Result<Self> {
        for artifact in [stage0, stage1] {
            if !artifact.is_built() {
                return Err(VerifyError::BuildFailure {
                    stage: artifact.stage,
                    reason: format!(
                        "artifact {} disappeared before checks could run",
                        artifact.executable_path.display()
                    ),
                    log: artifact.build_log.clone(),
                });
            }
        }
        Ok(Self {
            config,
            stage0,
            stage1,
        })
    }

    /// Run every check in order, appending each result to `report`.
    pub async fn run(&self, workspace: &mut Workspace, report: &mut ReportBuilder) -> Result<()> {
        // Compiled sample binaries for (stage0, stage1), or why there are none.
        let mut compiled: std::result::Result<(PathBuf, PathBuf), String> =
            Err("compilation check did not run".to_string());

        let total = CheckKind::ALL.len();
        for (i, kind) in CheckKind::ALL.into_iter().enumerate() {
            println!("[{}/{}] {} check...", i + 1, total, kind);

            let result = match kind {
                CheckKind::Version => self.compare_pair(kind, &["--version"]).await,
                CheckKind::Compilation => {
                    let (result, binaries) = self.compilation(workspace).await?;
                    compiled = binaries;
                    result
                }
                CheckKind::Runtime => match &compiled {
                    Ok((bin0, bin1)) => self.runtime(bin0, bin1).await,
                    Err(reason) => self.skipped(kind, reason.clone()),
                },
                CheckKind::SelfDiagnostics => self.compare_pair(kind, &["--self-check"]).await,
            };

            write_check_log(workspace, &result)?;
            print_outcome(&result);

            let unreachable = if result.fatal {
                unreachable_stage(&result)
            } else {
                None
            };
            report.push(result);
            if let Some((stage, failure)) = unreachable {
                return Err(VerifyError::StageUnreachable { stage, failure });
            }
        }
        Ok(())
    }

    /// Invoke both compilers with `args` and compare.
    async fn compare_pair(&self, kind: CheckKind, args: &[&str]) -> ComparisonResult {
        let out0 = self.invoke(&self.stage0.executable_path, args, &self.config.root).await;
        let out1 = self.invoke(&self.stage1.executable_path, args, &self.config.root).await;
        let mut result = ComparisonResult::compared(kind, out0, out1, self.stage1.delegated());

        // A compiler that cannot even be started is not a divergence.
        if kind == CheckKind::Version && unreachable_stage(&result).is_some() {
            result.fatal = true;
        }
        result
    }

    async fn compilation(
        &self,
        workspace: &mut Workspace,
    ) -> Result<(
        ComparisonResult,
        std::result::Result<(PathBuf, PathBuf), String>,
    )> {
        let kind = CheckKind::Compilation;
        let sample = &self.config.sample_program;
        if !self.config.has_sample_program() {
            let reason = format!("sample program not found: {}", sample.display());
            return Ok((self.skipped(kind, reason.clone()), Err(reason)));
        }

        let (out0, bin0) = self.compile_sample(self.stage0, workspace).await?;
        let (out1, bin1) = self.compile_sample(self.stage1, workspace).await?;

        let missing: Vec<String> = [(Stage::Stage0, &bin0), (Stage::Stage1, &bin1)]
            .iter()
            .filter(|(_, bin)| !bin.is_file())
            .map(|(stage, _)| stage.to_string())
            .collect();
        let binaries = if missing.is_empty() {
            Ok((bin0, bin1))
        } else {
            Err(format!("no compiled sample from {}", missing.join(" and ")))
        };

        let result = ComparisonResult::compared(kind, out0, out1, self.stage1.delegated());
        Ok((result, binaries))
    }

    /// Compile the sample inside the stage's own sample directory.
    async fn compile_sample(
        &self,
        artifact: &CompilerArtifact,
        workspace: &mut Workspace,
    ) -> Result<(Invocation, PathBuf)> {
        let dir = workspace.sample_dir(artifact.stage)?;
        let out = Cmd::new(&artifact.executable_path)
            .arg_path(&self.config.sample_program)
            .arg("-o")
            .arg(SAMPLE_BINARY)
            .dir(&dir)
            .timeout(self.config.invocation_timeout)
            .capture()
            .await;
        Ok((out, dir.join(SAMPLE_BINARY)))
    }

    async fn runtime(&self, bin0: &Path, bin1: &Path) -> ComparisonResult {
        let out0 = self.invoke(bin0, &[], &self.config.root).await;
        let out1 = self.invoke(bin1, &[], &self.config.root).await;
        ComparisonResult::compared(CheckKind::Runtime, out0, out1, self.stage1.delegated())
    }

    async fn invoke(&self, program: &Path, args: &[&str], dir: &Path) -> Invocation {
        Cmd::new(program)
            .args(args)
            .dir(dir)
            .timeout(self.config.invocation_timeout)
            .capture()
            .await
    }

    fn skipped(&self, kind: CheckKind, reason: String) -> ComparisonResult {
        ComparisonResult::skipped(kind, reason, self.stage1.delegated())
    }
}

/// First stage whose invocation could not be started, if any.
fn unreachable_stage(result: &ComparisonResult) -> Option<(Stage, InvocationFailure)> {
    [
        (Stage::Stage0, &result.stage0_output),
        (Stage::Stage1, &result.stage1_output),
    ]
    .into_iter()
    .find_map(|(stage, output)| {
        let failure = output.as_ref()?.failure()?;
        matches!(failure, InvocationFailure::Spawn(_)).then(|| (stage, failure.clone()))
    })
}

fn write_check_log(workspace: &mut Workspace, result: &ComparisonResult) -> Result<()> {
    let mut log = format!("check: {}\nverdict: {}\n", result.kind, result.verdict.label());
    for (stage, output) in [
        (Stage::Stage0, &result.stage0_output),
        (Stage::Stage1, &result.stage1_output),
    ] {
        log.push_str(&format!("\n=== {} ===\n", stage));
        match output {
            Some(inv) => log.push_str(&inv.describe()),
            None => log.push_str("not invoked\n"),
        }
    }
    fs::write(workspace.log_path(result.kind.name())?, log)?;
    Ok(())
}

fn print_outcome(result: &ComparisonResult) {
    match &result.verdict {
        compare::Verdict::Skipped(reason) => println!("  skipped: {}", reason),
        verdict if result.fatal => println!("  {} (fatal)", verdict.label().to_lowercase()),
        verdict => println!("  {}", verdict.label().to_lowercase()),
    }
    if let Some(diff) = &result.diff {
        for line in diff.lines() {
            tracing::debug!(check = %result.kind, "{}", line);
        }
    }
}
