//! Verification report.
//!
//! [`ReportBuilder`] collects artifact summaries and per-check results while
//! the run is in progress. [`ReportBuilder::finalize`] fixes the overall
//! verdict and yields an immutable [`VerificationReport`].
//!
//! The verdict only reflects fatal failures (missing toolchain, failed
//! builds, a stage that cannot be started). Check divergence is reported
//! but never fails the run.

use std::fmt::Write as _;

use serde::Serialize;

use crate::artifact::{CompilerArtifact, Stage};
use crate::checks::CheckKind;
use crate::compare::{self, Verdict};
use crate::error::VerifyError;
use crate::process::Invocation;

/// Build log lines shown for a fatal build failure.
const LOG_TAIL_LINES: usize = 20;

/// Output lines shown per stage under each check.
const OUTPUT_LINES: usize = 20;

/// Result of one equivalence check.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub kind: CheckKind,
    pub stage0_output: Option<Invocation>,
    pub stage1_output: Option<Invocation>,
    pub verdict: Verdict,
    /// Whether this result aborted the run.
    pub fatal: bool,
    /// Stage 1 was a delegation artifact, so `Identical` proves nothing.
    pub delegated: bool,
    /// Present when the verdict is `Differs`.
    pub diff: Option<String>,
}

impl ComparisonResult {
    /// Compare two invocations on the check's designated stream.
    pub fn compared(kind: CheckKind, stage0: Invocation, stage1: Invocation, delegated: bool) -> Self {
        let stream = kind.stream();
        let verdict = compare::compare(stream, &stage0, &stage1);
        let diff = (verdict == Verdict::Differs).then(|| compare::diff(stream, &stage0, &stage1));
        Self {
            kind,
            stage0_output: Some(stage0),
            stage1_output: Some(stage1),
            verdict,
            fatal: false,
            delegated,
            diff,
        }
    }

    /// A check that was not attempted.
    pub fn skipped(kind: CheckKind, reason: String, delegated: bool) -> Self {
        Self {
            kind,
            stage0_output: None,
            stage1_output: None,
            verdict: Verdict::Skipped(reason),
            fatal: false,
            delegated,
            diff: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.verdict, Verdict::Skipped(_))
    }
}

/// What the report shows about a built artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub stage: Stage,
    pub delegated: bool,
    pub digest: Option<String>,
}

/// The failure that ended the run early.
#[derive(Debug, Clone, Serialize)]
pub struct FatalFailure {
    pub kind: FatalKind,
    pub stage: Option<Stage>,
    pub message: String,
    pub build_log: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    ToolchainMissing,
    BuildFailure,
    StageUnreachable,
    Workspace,
}

impl From<&VerifyError> for FatalFailure {
    fn from(err: &VerifyError) -> Self {
        let (kind, stage) = match err {
            VerifyError::ToolchainMissing { .. } => (FatalKind::ToolchainMissing, None),
            VerifyError::BuildFailure { stage, .. } => (FatalKind::BuildFailure, Some(*stage)),
            VerifyError::StageUnreachable { stage, .. } => {
                (FatalKind::StageUnreachable, Some(*stage))
            }
            VerifyError::Workspace(_) => (FatalKind::Workspace, None),
        };
        Self {
            kind,
            stage,
            message: err.to_string(),
            build_log: err.build_log().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallVerdict {
    Pass,
    Fail,
}

/// Accumulates results while the run is in progress.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    artifacts: Vec<ArtifactSummary>,
    results: Vec<ComparisonResult>,
    fatal: Option<FatalFailure>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_artifact(&mut self, artifact: &CompilerArtifact) {
        self.artifacts.push(ArtifactSummary {
            stage: artifact.stage,
            delegated: artifact.delegated(),
            // A delegation script embeds the temp path; its hash means nothing.
            digest: if artifact.delegated() {
                None
            } else {
                artifact.digest.clone()
            },
        });
    }

    /// Append a check result. Results must arrive in check order.
    pub fn push(&mut self, result: ComparisonResult) {
        debug_assert_eq!(
            CheckKind::ALL.get(self.results.len()),
            Some(&result.kind),
            "check results out of order"
        );
        self.results.push(result);
    }

    /// Record the fatal error that ended the run. The first one wins.
    pub fn record_fatal(&mut self, err: &VerifyError) {
        if self.fatal.is_none() {
            self.fatal = Some(FatalFailure::from(err));
        }
    }

    /// Fix the verdict. Checks that never ran are listed as skipped.
    pub fn finalize(mut self) -> VerificationReport {
        let delegated = self.artifacts.iter().any(|a| a.delegated);
        let reason = match &self.fatal {
            Some(_) => "not run: verification aborted",
            None => "not run",
        };
        for kind in CheckKind::ALL.iter().skip(self.results.len()) {
            self.results
                .push(ComparisonResult::skipped(*kind, reason.to_string(), delegated));
        }

        let verdict = if self.fatal.is_some() {
            OverallVerdict::Fail
        } else {
            OverallVerdict::Pass
        };

        VerificationReport {
            artifacts: self.artifacts,
            results: self.results,
            fatal: self.fatal,
            delegated,
            verdict,
        }
    }
}

/// Final, read-only report.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    artifacts: Vec<ArtifactSummary>,
    results: Vec<ComparisonResult>,
    fatal: Option<FatalFailure>,
    delegated: bool,
    verdict: OverallVerdict,
}

impl VerificationReport {
    pub fn verdict(&self) -> OverallVerdict {
        self.verdict
    }

    pub fn passed(&self) -> bool {
        self.verdict == OverallVerdict::Pass
    }

    /// Process exit code: 0 on pass, 1 on fail.
    pub fn exit_code(&self) -> i32 {
        match self.verdict {
            OverallVerdict::Pass => 0,
            OverallVerdict::Fail => 1,
        }
    }

    pub fn results(&self) -> &[ComparisonResult] {
        &self.results
    }

    pub fn result(&self, kind: CheckKind) -> Option<&ComparisonResult> {
        self.results.iter().find(|r| r.kind == kind)
    }

    pub fn artifacts(&self) -> &[ArtifactSummary] {
        &self.artifacts
    }

    pub fn fatal(&self) -> Option<&FatalFailure> {
        self.fatal.as_ref()
    }

    /// Stage 1 is a delegation artifact.
    pub fn delegated(&self) -> bool {
        self.delegated
    }

    pub fn count(&self, label: &str) -> usize {
        self.results
            .iter()
            .filter(|r| r.verdict.label() == label)
            .count()
    }

    /// Deterministic text rendering, ending in a PASS/FAIL banner.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Bootstrap Equivalence Report ===\n");

        for artifact in &self.artifacts {
            let _ = match (&artifact.digest, artifact.delegated) {
                (_, true) => writeln!(out, "  {}: delegation artifact (forwards to Stage 0)", artifact.stage),
                (Some(digest), false) => writeln!(out, "  {}: direct build (sha256 {})", artifact.stage, digest),
                (None, false) => writeln!(out, "  {}: direct build", artifact.stage),
            };
        }
        if !self.artifacts.is_empty() {
            out.push('\n');
        }

        for result in &self.results {
            let icon = match (&result.verdict, result.fatal) {
                (_, true) => "✗",
                (Verdict::Identical, _) => "✓",
                (Verdict::Differs, _) => "≠",
                (Verdict::Skipped(_), _) => "○",
            };
            let _ = write!(out, "  {} [{}] {}", icon, result.verdict.label(), result.kind);
            if let Verdict::Skipped(reason) = &result.verdict {
                let _ = write!(out, ": {}", reason);
            } else if result.delegated {
                out.push_str(" (delegated: cannot show divergence)");
            }
            if result.fatal {
                out.push_str(" [FATAL]");
            }
            out.push('\n');
            let outputs = [
                (Stage::Stage0, &result.stage0_output),
                (Stage::Stage1, &result.stage1_output),
            ];
            for (stage, invocation) in outputs {
                if let Some(invocation) = invocation {
                    render_output(&mut out, stage, result.kind, invocation);
                }
            }
            if let Some(diff) = &result.diff {
                for line in diff.lines() {
                    let _ = writeln!(out, "      {}", line);
                }
            }
        }

        let _ = writeln!(
            out,
            "\nSummary: {} identical, {} differ, {} skipped",
            self.count("IDENTICAL"),
            self.count("DIFFERS"),
            self.count("SKIPPED")
        );
        if self.delegated {
            let _ = writeln!(
                out,
                "NOTE: Stage 1 is a delegation artifact; identical results do not demonstrate self-hosting."
            );
        }

        if let Some(fatal) = &self.fatal {
            let _ = writeln!(out, "\nFATAL: {}", fatal.message);
            if let Some(log) = &fatal.build_log {
                let lines: Vec<&str> = log.lines().collect();
                let start = lines.len().saturating_sub(LOG_TAIL_LINES);
                let _ = writeln!(out, "  build log (last {} lines):", lines.len() - start);
                for line in &lines[start..] {
                    let _ = writeln!(out, "  | {}", line);
                }
            }
        }

        let banner = match self.verdict {
            OverallVerdict::Pass => "PASS",
            OverallVerdict::Fail => "FAIL",
        };
        let _ = writeln!(out, "\n=== {} ===", banner);
        out
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        print!("{}", self.render());
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn render_output(out: &mut String, stage: Stage, kind: CheckKind, invocation: &Invocation) {
    let lines = compare::designated_lines(kind.stream(), invocation);
    for line in lines.iter().take(OUTPUT_LINES) {
        let _ = writeln!(out, "      {} | {}", stage, line);
    }
    if lines.len() > OUTPUT_LINES {
        let _ = writeln!(
            out,
            "      {} | ... {} more line(s)",
            stage,
            lines.len() - OUTPUT_LINES
        );
    }
}
