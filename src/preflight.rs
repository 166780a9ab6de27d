//! Toolchain probe.
//!
//! Confirms the trusted toolchain is callable before any work begins.
//! Nothing is created on disk here, so a failed probe leaves nothing to
//! clean up.

use std::path::PathBuf;

use crate::error::{Result, VerifyError};

/// Install hints for common toolchains.
const KNOWN_TOOLCHAINS: &[(&str, &str)] = &[
    ("cargo", "Install Rust via https://rustup.rs"),
    ("rustc", "Install Rust via https://rustup.rs"),
    ("go", "Install Go from https://go.dev/dl"),
    ("gcc", "Install the 'gcc' package"),
    ("clang", "Install the 'clang' package"),
    ("cc", "Install a C compiler ('gcc' or 'clang' package)"),
    ("make", "Install the 'make' package"),
    ("zig", "Install Zig from https://ziglang.org/download"),
];

/// Resolve `tool` to an executable path.
///
/// Accepts a bare name (searched on PATH) or a path.
pub fn probe(tool: &str) -> Result<PathBuf> {
    match which::which(tool) {
        Ok(path) => {
            tracing::debug!(tool, path = %path.display(), "toolchain found");
            Ok(path)
        }
        Err(e) => {
            tracing::debug!(tool, error = %e, "toolchain lookup failed");
            Err(VerifyError::ToolchainMissing {
                tool: tool.to_string(),
                hint: remediation(tool),
            })
        }
    }
}

fn remediation(tool: &str) -> String {
    let name = tool.rsplit('/').next().unwrap_or(tool);
    let install = KNOWN_TOOLCHAINS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, hint)| format!("{}, or", hint))
        .unwrap_or_else(|| "Install it, or".to_string());
    format!(
        "{} point BOOTSTRAP_TOOLCHAIN at the program that builds the reference compiler.",
        install
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_finds_sh() {
        // `sh` should exist on any Unix system
        let path = probe("sh").unwrap();
        assert!(path.is_absolute());
    }

    #[test]
    fn test_probe_missing_tool() {
        let err = probe("nonexistent_toolchain_12345").unwrap_err();
        match err {
            VerifyError::ToolchainMissing { tool, hint } => {
                assert_eq!(tool, "nonexistent_toolchain_12345");
                assert!(hint.contains("BOOTSTRAP_TOOLCHAIN"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_probe_missing_path() {
        assert!(probe("/nonexistent/dir/cargo").is_err());
    }

    #[test]
    fn test_remediation_known_tool() {
        assert!(remediation("/usr/local/bin/cargo").contains("rustup"));
        assert!(remediation("mystery").starts_with("Install it, or"));
    }
}
