//! Error types for the verification pipeline.
//!
//! Only fatal conditions are errors. Invocation failures and output
//! divergence are recorded as report data instead (see `process::Invocation`
//! and `compare::Verdict`).

use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::Stage;
use crate::process::InvocationFailure;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Toolchain '{tool}' not found. {hint}")]
    ToolchainMissing { tool: String, hint: String },

    #[error("{stage} build failed: {reason}")]
    BuildFailure {
        stage: Stage,
        reason: String,
        log: String,
    },

    #[error("{stage} could not be invoked at all: {failure}")]
    StageUnreachable {
        stage: Stage,
        failure: InvocationFailure,
    },

    #[error("Work directory error: {0}")]
    Workspace(#[from] std::io::Error),
}

impl VerifyError {
    /// Build log attached to the failure, if any.
    pub fn build_log(&self) -> Option<&str> {
        match self {
            VerifyError::BuildFailure { log, .. } if !log.is_empty() => Some(log),
            _ => None,
        }
    }
}

/// Teardown could not remove part of the work directory.
///
/// Logged only; never changes the verdict.
#[derive(Error, Debug)]
#[error("Failed to remove {}: {source}", .path.display())]
pub struct CleanupFailure {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, VerifyError>;
