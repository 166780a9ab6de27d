//! Centralized command execution with captured output and bounded runtime.
//!
//! Every external invocation (toolchain builds, compiler checks, compiled
//! sample programs) goes through [`Cmd`]. The result is an [`Invocation`]:
//! either the process ran to completion and we have its output, or it never
//! produced one. Neither case is an error at this layer; callers decide what
//! a failed invocation means for them.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::process::Command;

/// Default bound for a single invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// "Text file busy": a freshly written script is still open in a child
/// forked by another thread.
const ETXTBSY: i32 = 26;
const SPAWN_ATTEMPTS: u32 = 5;

/// Output of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedOutput {
    /// Raw stdout bytes.
    #[serde(serialize_with = "lossy_text")]
    pub stdout: Vec<u8>,
    /// Raw stderr bytes.
    #[serde(serialize_with = "lossy_text")]
    pub stderr: Vec<u8>,
    /// Exit code, or -1 if terminated by signal.
    pub exit_code: i32,
}

impl CapturedOutput {
    /// Returns true if the process exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout decoded lossily.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded lossily.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Stdout and stderr joined, for build logs.
    pub fn combined_log(&self) -> String {
        let stdout = self.stdout_text();
        let stderr = self.stderr_text();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr,
            (false, true) => stdout,
            (false, false) => format!("{}\n{}", stdout.trim_end(), stderr),
        }
    }
}

fn lossy_text<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Why an invocation produced no output.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum InvocationFailure {
    /// The program could not be started.
    #[error("failed to execute: {0}")]
    Spawn(String),
    /// The program did not finish within its time bound.
    #[error("timed out after {0:?}")]
    TimedOut(#[serde(serialize_with = "as_millis")] Duration),
}

/// Outcome of running one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Invocation {
    Completed(CapturedOutput),
    Failed { failure: InvocationFailure },
}

impl Invocation {
    pub fn output(&self) -> Option<&CapturedOutput> {
        match self {
            Invocation::Completed(output) => Some(output),
            Invocation::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&InvocationFailure> {
        match self {
            Invocation::Completed(_) => None,
            Invocation::Failed { failure } => Some(failure),
        }
    }

    /// Completed with exit status 0.
    pub fn succeeded(&self) -> bool {
        self.output().is_some_and(CapturedOutput::success)
    }

    /// Text form for log files.
    pub fn describe(&self) -> String {
        match self {
            Invocation::Completed(out) => format!(
                "exit code: {}\n--- stdout ---\n{}\n--- stderr ---\n{}\n",
                out.exit_code,
                out.stdout_text(),
                out.stderr_text()
            ),
            Invocation::Failed { failure } => format!("invocation failed: {}\n", failure),
        }
    }
}

/// Builder for configuring command execution.
pub struct Cmd {
    program: PathBuf,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    timeout: Duration,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            current_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().into());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Bound the wall-clock runtime. Exceeding it kills the child.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the command and capture its output.
    ///
    /// Never fails: spawn errors and timeouts come back as
    /// [`Invocation::Failed`].
    pub async fn capture(self) -> Invocation {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(program = %self.program.display(), args = ?self.args, "invoking");

        let child = match spawn(&mut cmd).await {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(program = %self.program.display(), error = %e, "spawn failed");
                return Invocation::Failed {
                    failure: InvocationFailure::Spawn(format!(
                        "'{}': {}",
                        self.program.display(),
                        e
                    )),
                };
            }
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Invocation::Completed(CapturedOutput {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.status.code().unwrap_or(-1),
            }),
            Ok(Err(e)) => Invocation::Failed {
                failure: InvocationFailure::Spawn(format!(
                    "'{}': {}",
                    self.program.display(),
                    e
                )),
            },
            // The child future is dropped here, which kills the process.
            Err(_) => Invocation::Failed {
                failure: InvocationFailure::TimedOut(self.timeout),
            },
        }
    }
}

async fn spawn(cmd: &mut Command) -> std::io::Result<tokio::process::Child> {
    let mut attempt = 1;
    loop {
        match cmd.spawn() {
            Err(e) if e.raw_os_error() == Some(ETXTBSY) && attempt < SPAWN_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            result => return result,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
