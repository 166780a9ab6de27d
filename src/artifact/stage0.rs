//! Stage 0 builder - reference compiler from the trusted toolchain.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{Result, VerifyError};
use crate::process::{Cmd, Invocation};
use crate::workspace::Workspace;

use super::{make_executable, ArtifactKind, CompilerArtifact, Stage};

/// Build Stage 0 and copy it into the work directory as `stage0`.
///
/// Runs `<toolchain> <toolchain args>` inside the compiler source
/// directory. A non-zero exit, a timeout, or a missing output binary is a
/// fatal `BuildFailure`. Rerunning overwrites the previous `stage0`.
pub async fn build_stage0(
    config: &Config,
    toolchain: &Path,
    workspace: &mut Workspace,
) -> Result<CompilerArtifact> {
    let stage = Stage::Stage0;

    let invocation = Cmd::new(toolchain)
        .args(&config.toolchain_args)
        .dir(&config.compiler_source)
        .timeout(config.build_timeout)
        .capture()
        .await;

    let log = build_log(&invocation);
    fs::write(workspace.log_path(stage.build_log_name())?, &log)?;

    match &invocation {
        Invocation::Failed { failure } => {
            return Err(VerifyError::BuildFailure {
                stage,
                reason: failure.to_string(),
                log,
            });
        }
        Invocation::Completed(out) if !out.success() => {
            return Err(VerifyError::BuildFailure {
                stage,
                reason: format!("toolchain exited with code {}", out.exit_code),
                log,
            });
        }
        Invocation::Completed(_) => {}
    }

    if !config.stage0_output.is_file() {
        return Err(VerifyError::BuildFailure {
            stage,
            reason: format!(
                "toolchain succeeded but {} was not produced",
                config.stage0_output.display()
            ),
            log,
        });
    }

    let dest = workspace.artifact_path(stage)?;
    fs::copy(&config.stage0_output, &dest)?;
    make_executable(&dest)?;

    Ok(CompilerArtifact::new(stage, dest, ArtifactKind::Direct, log))
}

/// Log text for a build invocation, whatever its outcome.
pub(crate) fn build_log(invocation: &Invocation) -> String {
    match invocation {
        Invocation::Completed(out) => out.combined_log(),
        Invocation::Failed { failure } => format!("invocation failed: {}", failure),
    }
}
