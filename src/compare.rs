//! Output comparison.
//!
//! Exact, byte-level comparison of the designated stream(s) of two
//! invocations. No normalization of any kind is applied. A difference is a
//! result, never an error.

use serde::Serialize;

use crate::process::{CapturedOutput, Invocation};

/// Maximum number of diff lines kept in a report entry.
const MAX_DIFF_LINES: usize = 40;

/// Which parts of a captured output a check compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Stdout only.
    Stdout,
    /// Exit status and stdout.
    StatusAndStdout,
    /// Exit status, stdout and stderr (the full compile log).
    StatusAndLog,
}

impl Stream {
    fn includes_status(self) -> bool {
        !matches!(self, Stream::Stdout)
    }

    fn includes_stderr(self) -> bool {
        matches!(self, Stream::StatusAndLog)
    }
}

/// Outcome of one equivalence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "reason")]
pub enum Verdict {
    Identical,
    Differs,
    /// The check was not attempted.
    Skipped(String),
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Identical => "IDENTICAL",
            Verdict::Differs => "DIFFERS",
            Verdict::Skipped(_) => "SKIPPED",
        }
    }
}

/// Compare two completed outputs on `stream`.
pub fn compare_outputs(stream: Stream, a: &CapturedOutput, b: &CapturedOutput) -> Verdict {
    let same = a.stdout == b.stdout
        && (!stream.includes_status() || a.exit_code == b.exit_code)
        && (!stream.includes_stderr() || a.stderr == b.stderr);
    if same {
        Verdict::Identical
    } else {
        Verdict::Differs
    }
}

/// Compare two invocations. A failed invocation on either side differs:
/// no output can't demonstrate equivalence.
pub fn compare(stream: Stream, a: &Invocation, b: &Invocation) -> Verdict {
    match (a.output(), b.output()) {
        (Some(a), Some(b)) => compare_outputs(stream, a, b),
        _ => Verdict::Differs,
    }
}

/// Human-readable difference between two invocations on `stream`.
///
/// Stage 0 lines are prefixed with `-`, Stage 1 lines with `+`. Lines are
/// paired by position.
pub fn diff(stream: Stream, a: &Invocation, b: &Invocation) -> String {
    let mut lines = Vec::new();

    let (a, b) = match (a, b) {
        (Invocation::Completed(a), Invocation::Completed(b)) => (a, b),
        _ => {
            lines.push(format!("- {}", summarize(a)));
            lines.push(format!("+ {}", summarize(b)));
            return lines.join("\n");
        }
    };

    if stream.includes_status() && a.exit_code != b.exit_code {
        lines.push(format!("- exit code {}", a.exit_code));
        lines.push(format!("+ exit code {}", b.exit_code));
    }
    if a.stdout != b.stdout {
        diff_lines("stdout", &a.stdout_text(), &b.stdout_text(), &mut lines);
    }
    if stream.includes_stderr() && a.stderr != b.stderr {
        diff_lines("stderr", &a.stderr_text(), &b.stderr_text(), &mut lines);
    }

    if lines.len() > MAX_DIFF_LINES {
        let hidden = lines.len() - MAX_DIFF_LINES;
        lines.truncate(MAX_DIFF_LINES);
        lines.push(format!("... {} more line(s)", hidden));
    }
    lines.join("\n")
}

/// The designated stream(s) of one invocation, as report lines.
///
/// Stderr lines are prefixed with `stderr: ` so they stay distinguishable
/// from stdout.
pub fn designated_lines(stream: Stream, invocation: &Invocation) -> Vec<String> {
    let out = match invocation {
        Invocation::Completed(out) => out,
        Invocation::Failed { .. } => return vec![summarize(invocation)],
    };

    let mut lines = Vec::new();
    if stream.includes_status() {
        lines.push(format!("exit code {}", out.exit_code));
    }
    let stdout = out.stdout_text();
    if stdout.is_empty() {
        lines.push("(no stdout)".to_string());
    } else {
        lines.extend(stdout.lines().map(str::to_string));
    }
    if stream.includes_stderr() {
        lines.extend(out.stderr_text().lines().map(|l| format!("stderr: {}", l)));
    }
    lines
}

fn summarize(invocation: &Invocation) -> String {
    match invocation {
        Invocation::Completed(out) => format!("completed with exit code {}", out.exit_code),
        Invocation::Failed { failure } => format!("invocation failed: {}", failure),
    }
}

fn diff_lines(label: &str, a: &str, b: &str, out: &mut Vec<String>) {
    out.push(format!("@@ {} @@", label));
    let a_lines: Vec<&str> = a.split('\n').collect();
    let b_lines: Vec<&str> = b.split('\n').collect();
    let mut differing = 0;
    for i in 0..a_lines.len().max(b_lines.len()) {
        let left = a_lines.get(i);
        let right = b_lines.get(i);
        if left == right {
            continue;
        }
        differing += 1;
        if let Some(l) = left {
            out.push(format!("- {}", l));
        }
        if let Some(r) = right {
            out.push(format!("+ {}", r));
        }
    }
    // Same lines, different bytes (e.g. invalid UTF-8 decoded identically).
    if differing == 0 {
        out.push("  (byte-level difference not visible as text)".to_string());
    }
}
