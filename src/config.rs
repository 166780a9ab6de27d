//! Configuration management for stagecheck.
//!
//! Reads configuration from a .env file in the project root and from
//! environment variables. Environment variables take precedence over .env.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Default trusted toolchain.
pub const DEFAULT_TOOLCHAIN: &str = "cargo";
/// Default toolchain arguments for the Stage 0 build.
pub const DEFAULT_TOOLCHAIN_ARGS: &str = "build --release";
/// Default Stage 0 binary location, relative to the compiler source.
pub const DEFAULT_STAGE0_OUTPUT: &str = "target/release/compiler";
/// Default self-hosted compiler entry source.
pub const DEFAULT_SELF_HOSTED_SOURCE: &str = "bootstrap/compiler.src";
/// Default sample program for the compilation and runtime checks.
pub const DEFAULT_SAMPLE_PROGRAM: &str = "bootstrap/sample.src";

const DEFAULT_INVOCATION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 1800;

/// Verifier configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root; relative paths below resolve against it.
    pub root: PathBuf,
    /// Trusted toolchain program (name on PATH or a path)
    pub toolchain: String,
    /// Arguments passed to the toolchain for the Stage 0 build
    pub toolchain_args: Vec<String>,
    /// Directory the toolchain runs in
    pub compiler_source: PathBuf,
    /// Binary produced by the toolchain (absolute)
    pub stage0_output: PathBuf,
    /// Self-hosted compiler source (may not exist)
    pub self_hosted_source: PathBuf,
    /// Fixed sample program (may not exist)
    pub sample_program: PathBuf,
    /// Parent of the per-run work directory
    pub work_root: PathBuf,
    /// Bound for each check invocation
    pub invocation_timeout: Duration,
    /// Bound for each build invocation
    pub build_timeout: Duration,
    /// Optional destination for the JSON report
    pub report_json: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `<root>/.env` and the environment.
    pub fn load(root: &Path) -> Result<Self> {
        let mut vars = HashMap::new();

        let env_path = root.join(".env");
        if env_path.exists() {
            let entries = dotenvy::from_path_iter(&env_path)
                .with_context(|| format!("Failed to read {}", env_path.display()))?;
            for entry in entries {
                let (key, value) =
                    entry.with_context(|| format!("Malformed line in {}", env_path.display()))?;
                vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        for (key, value) in std::env::vars() {
            vars.insert(key, value);
        }

        Self::from_vars(root, &vars)
    }

    /// Build a configuration from an explicit variable map.
    pub fn from_vars(root: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let resolve = |base: &Path, value: &str| {
            let path = PathBuf::from(value);
            if path.is_absolute() {
                path
            } else {
                base.join(path)
            }
        };

        let toolchain = get("BOOTSTRAP_TOOLCHAIN")
            .unwrap_or(DEFAULT_TOOLCHAIN)
            .to_string();

        // An explicitly empty value means "no arguments", unlike an unset one.
        let toolchain_args = vars
            .get("BOOTSTRAP_TOOLCHAIN_ARGS")
            .map(String::as_str)
            .unwrap_or(DEFAULT_TOOLCHAIN_ARGS)
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let compiler_source = get("BOOTSTRAP_COMPILER_SOURCE")
            .map(|s| resolve(root, s))
            .unwrap_or_else(|| root.to_path_buf());

        let stage0_output = resolve(
            &compiler_source,
            get("BOOTSTRAP_STAGE0_OUTPUT").unwrap_or(DEFAULT_STAGE0_OUTPUT),
        );

        let self_hosted_source = resolve(
            root,
            get("BOOTSTRAP_SELF_HOSTED_SOURCE").unwrap_or(DEFAULT_SELF_HOSTED_SOURCE),
        );

        let sample_program = resolve(
            root,
            get("BOOTSTRAP_SAMPLE_PROGRAM").unwrap_or(DEFAULT_SAMPLE_PROGRAM),
        );

        let work_root = get("BOOTSTRAP_WORK_ROOT")
            .map(|s| resolve(root, s))
            .unwrap_or_else(std::env::temp_dir);

        let invocation_timeout = parse_timeout(
            get("BOOTSTRAP_INVOCATION_TIMEOUT"),
            "BOOTSTRAP_INVOCATION_TIMEOUT",
            DEFAULT_INVOCATION_TIMEOUT_SECS,
        )?;
        let build_timeout = parse_timeout(
            get("BOOTSTRAP_BUILD_TIMEOUT"),
            "BOOTSTRAP_BUILD_TIMEOUT",
            DEFAULT_BUILD_TIMEOUT_SECS,
        )?;

        let report_json = get("BOOTSTRAP_REPORT_JSON").map(|s| resolve(root, s));

        Ok(Self {
            root: root.to_path_buf(),
            toolchain,
            toolchain_args,
            compiler_source,
            stage0_output,
            self_hosted_source,
            sample_program,
            work_root,
            invocation_timeout,
            build_timeout,
            report_json,
        })
    }

    /// Check if self-hosted compiler source is available.
    pub fn has_self_hosted_source(&self) -> bool {
        self.self_hosted_source.is_file()
    }

    /// Check if the sample program is available.
    pub fn has_sample_program(&self) -> bool {
        self.sample_program.is_file()
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  ROOT: {}", self.root.display());
        println!(
            "  TOOLCHAIN: {} {}",
            self.toolchain,
            self.toolchain_args.join(" ")
        );
        println!("  COMPILER_SOURCE: {}", self.compiler_source.display());
        println!("  STAGE0_OUTPUT: {}", self.stage0_output.display());
        println!("  WORK_ROOT: {}", self.work_root.display());
        println!(
            "  TIMEOUTS: invocation {}s, build {}s",
            self.invocation_timeout.as_secs(),
            self.build_timeout.as_secs()
        );
        if self.has_self_hosted_source() {
            println!(
                "  Self-hosted source: FOUND ({})",
                self.self_hosted_source.display()
            );
        } else {
            println!("  Self-hosted source: NOT FOUND (stage 1 will delegate to stage 0)");
        }
        if self.has_sample_program() {
            println!("  Sample program: FOUND ({})", self.sample_program.display());
        } else {
            println!("  Sample program: NOT FOUND (compilation/runtime checks will be skipped)");
        }
        if let Some(ref path) = self.report_json {
            println!("  REPORT_JSON: {}", path.display());
        }
    }
}

fn parse_timeout(value: Option<&str>, key: &str, default_secs: u64) -> Result<Duration> {
    let secs = match value {
        None => default_secs,
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{} must be a number of seconds, got '{}'", key, raw))?,
    };
    if secs == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_secs(secs))
}
