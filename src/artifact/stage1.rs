//! Stage 1 builder.
//!
//! With self-hosted source present, Stage 0 compiles it into `stage1`.
//! Without it, `stage1` becomes a delegation artifact: a shell wrapper that
//! `exec`s Stage 0 with the same arguments, so stdin, stdout, stderr and the
//! exit status pass through untouched. Every check still runs against a
//! real executable, but identical results from a delegated Stage 1 prove
//! nothing about self-hosting, and the artifact says so via its kind.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{Result, VerifyError};
use crate::process::{Cmd, Invocation};
use crate::workspace::Workspace;

use super::stage0::build_log;
use super::{make_executable, ArtifactKind, CompilerArtifact, Stage};

/// Build Stage 1 from `stage0`, or write a delegation artifact.
pub async fn build_stage1(
    config: &Config,
    stage0: &CompilerArtifact,
    workspace: &mut Workspace,
) -> Result<CompilerArtifact> {
    if config.has_self_hosted_source() {
        compile_self_hosted(config, stage0, workspace).await
    } else {
        tracing::debug!(
            source = %config.self_hosted_source.display(),
            "no self-hosted source, writing delegation artifact"
        );
        delegate(stage0, workspace)
    }
}

async fn compile_self_hosted(
    config: &Config,
    stage0: &CompilerArtifact,
    workspace: &mut Workspace,
) -> Result<CompilerArtifact> {
    let stage = Stage::Stage1;
    let dest = workspace.artifact_path(stage)?;
    if dest.exists() {
        fs::remove_file(&dest)?;
    }

    let invocation = Cmd::new(&stage0.executable_path)
        .arg_path(&config.self_hosted_source)
        .arg("-o")
        .arg_path(&dest)
        .dir(&config.root)
        .timeout(config.build_timeout)
        .capture()
        .await;

    let log = build_log(&invocation);
    fs::write(workspace.log_path(stage.build_log_name())?, &log)?;

    let reason = match &invocation {
        Invocation::Failed { failure } => Some(failure.to_string()),
        Invocation::Completed(out) if !out.success() => Some(format!(
            "{} exited with code {} compiling {}",
            Stage::Stage0,
            out.exit_code,
            config.self_hosted_source.display()
        )),
        Invocation::Completed(_) if !dest.is_file() => Some(format!(
            "{} reported success but produced no binary",
            Stage::Stage0
        )),
        Invocation::Completed(_) => None,
    };
    if let Some(reason) = reason {
        return Err(VerifyError::BuildFailure { stage, reason, log });
    }

    make_executable(&dest)?;
    Ok(CompilerArtifact::new(stage, dest, ArtifactKind::Direct, log))
}

fn delegate(stage0: &CompilerArtifact, workspace: &mut Workspace) -> Result<CompilerArtifact> {
    let stage = Stage::Stage1;
    let dest = workspace.artifact_path(stage)?;
    let target = stage0.executable_path.clone();

    fs::write(&dest, delegation_script(&target)).map_err(|e| VerifyError::BuildFailure {
        stage,
        reason: format!("could not write delegation artifact: {}", e),
        log: String::new(),
    })?;
    make_executable(&dest)?;

    let log = format!(
        "delegation artifact: forwards all invocations to {}",
        target.display()
    );
    fs::write(workspace.log_path(stage.build_log_name())?, &log)?;

    Ok(CompilerArtifact::new(
        stage,
        dest,
        ArtifactKind::Delegated { target },
        log,
    ))
}

/// Shell wrapper that replaces itself with `target`, forwarding arguments.
pub fn delegation_script(target: &Path) -> String {
    format!(
        "#!/bin/sh\n# Delegation artifact: no self-hosted source was available.\nexec {} \"$@\"\n",
        shell_quote(&target.to_string_lossy())
    )
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// A stage0 stand-in that echoes its arguments and stdin-independent
    /// output, and exits with the code given by `--exit N`.
    fn fake_stage0(dir: &Path) -> CompilerArtifact {
        let path = dir.join("stage0");
        fs::write(
            &path,
            "#!/bin/sh\n\
             case \"$1\" in\n\
               --exit) echo \"exiting $2\" >&2; exit \"$2\" ;;\n\
               --version) echo 'fakec 1.0' ;;\n\
               *) [ \"$2\" = \"-o\" ] && printf '#!/bin/sh\\necho built\\n' > \"$3\"; echo \"args: $*\" ;;\n\
             esac\n",
        )
        .unwrap();
        make_executable(&path).unwrap();
        CompilerArtifact::new(Stage::Stage0, path, ArtifactKind::Direct, String::new())
    }

    fn config(root: &Path, self_hosted: &str) -> Config {
        let mut vars = HashMap::new();
        vars.insert(
            "BOOTSTRAP_SELF_HOSTED_SOURCE".to_string(),
            self_hosted.to_string(),
        );
        Config::from_vars(root, &vars).unwrap()
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_delegation_script_execs_target() {
        let script = delegation_script(&PathBuf::from("/work/stage0"));
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.ends_with("exec '/work/stage0' \"$@\"\n"));
    }

    #[tokio::test]
    async fn test_delegation_when_source_absent() {
        let temp = TempDir::new().unwrap();
        let stage0 = fake_stage0(temp.path());
        let cfg = config(temp.path(), "missing/compiler.src");
        let mut ws = Workspace::new(&temp.path().join("work"));

        let stage1 = build_stage1(&cfg, &stage0, &mut ws).await.unwrap();

        assert!(stage1.delegated());
        assert!(stage1.is_built());
        assert_eq!(
            stage1.kind,
            ArtifactKind::Delegated {
                target: stage0.executable_path.clone()
            }
        );
    }

    #[tokio::test]
    async fn test_delegation_forwards_output_and_exit_code() {
        let temp = TempDir::new().unwrap();
        let stage0 = fake_stage0(temp.path());
        let cfg = config(temp.path(), "missing/compiler.src");
        let mut ws = Workspace::new(&temp.path().join("work"));
        let stage1 = build_stage1(&cfg, &stage0, &mut ws).await.unwrap();

        for args in [
            vec!["--version"],
            vec!["--exit", "3"],
            vec!["two words", "x"],
        ] {
            let direct = Cmd::new(&stage0.executable_path).args(&args).capture().await;
            let forwarded = Cmd::new(&stage1.executable_path).args(&args).capture().await;
            assert_eq!(direct, forwarded, "args {:?}", args);
        }
    }

    #[tokio::test]
    async fn test_self_hosted_source_is_compiled() {
        let temp = TempDir::new().unwrap();
        let stage0 = fake_stage0(temp.path());
        fs::write(temp.path().join("compiler.src"), "fn main() {}").unwrap();
        let cfg = config(temp.path(), "compiler.src");
        let mut ws = Workspace::new(&temp.path().join("work"));

        let stage1 = build_stage1(&cfg, &stage0, &mut ws).await.unwrap();

        assert!(!stage1.delegated());
        assert_eq!(stage1.executable_path.file_name().unwrap(), "stage1");
        assert!(stage1.build_log.contains("compiler.src"));
    }

    #[tokio::test]
    async fn test_failed_self_hosted_build() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stage0");
        fs::write(&path, "#!/bin/sh\necho 'parse error' >&2\nexit 1\n").unwrap();
        make_executable(&path).unwrap();
        let stage0 = CompilerArtifact::new(Stage::Stage0, path, ArtifactKind::Direct, String::new());
        fs::write(temp.path().join("compiler.src"), "garbage").unwrap();
        let cfg = config(temp.path(), "compiler.src");
        let mut ws = Workspace::new(&temp.path().join("work"));

        let err = build_stage1(&cfg, &stage0, &mut ws).await.unwrap_err();
        match err {
            VerifyError::BuildFailure { stage, log, .. } => {
                assert_eq!(stage, Stage::Stage1);
                assert!(log.contains("parse error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
