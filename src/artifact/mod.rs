//! Compiler artifacts - the Stage 0 and Stage 1 binaries under comparison.
//!
//! - `stage0` - reference compiler built by the trusted toolchain
//! - `stage1` - compiler built by Stage 0, or a delegation artifact when no
//!   self-hosted source exists
//!
//! Both kinds satisfy the same invocation contract, so the check runner
//! never needs to know which one it is driving.

pub mod stage0;
pub mod stage1;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

pub use stage0::build_stage0;
pub use stage1::{build_stage1, delegation_script};

/// Which bootstrap stage an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Stage0,
    Stage1,
}

impl Stage {
    /// File name inside the work directory. Never changes.
    pub fn file_name(self) -> &'static str {
        match self {
            Stage::Stage0 => "stage0",
            Stage::Stage1 => "stage1",
        }
    }

    /// Name of the build log written for this stage.
    pub fn build_log_name(self) -> &'static str {
        match self {
            Stage::Stage0 => "build-stage0",
            Stage::Stage1 => "build-stage1",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Stage0 => write!(f, "Stage 0"),
            Stage::Stage1 => write!(f, "Stage 1"),
        }
    }
}

/// How an artifact was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ArtifactKind {
    /// A real compiler binary.
    Direct,
    /// A thin wrapper forwarding every invocation to `target`.
    Delegated { target: PathBuf },
}

/// A built compiler binary. Only constructed after a successful build and
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct CompilerArtifact {
    pub stage: Stage,
    pub executable_path: PathBuf,
    pub kind: ArtifactKind,
    /// Captured build output.
    pub build_log: String,
    /// SHA256 of the executable, if it could be read.
    pub digest: Option<String>,
}

impl CompilerArtifact {
    fn new(stage: Stage, executable_path: PathBuf, kind: ArtifactKind, build_log: String) -> Self {
        let digest = file_digest(&executable_path);
        Self {
            stage,
            executable_path,
            kind,
            build_log,
            digest,
        }
    }

    /// True if this artifact forwards to another stage instead of being a
    /// real build.
    pub fn delegated(&self) -> bool {
        matches!(self.kind, ArtifactKind::Delegated { .. })
    }

    /// The executable is still present on disk.
    pub fn is_built(&self) -> bool {
        self.executable_path.is_file()
    }

    /// Short digest for display.
    pub fn short_digest(&self) -> &str {
        self.digest
            .as_deref()
            .map(|d| &d[..d.len().min(16)])
            .unwrap_or("unavailable")
    }
}

/// Compute the SHA256 hash of a file.
/// Logs a warning and returns None if the file can't be read.
pub fn file_digest(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(content) => {
            let mut hasher = Sha256::new();
            hasher.update(&content);
            Some(format!("{:x}", hasher.finalize()))
        }
        Err(e) => {
            eprintln!(
                "  [WARN] Failed to read {} for hashing: {}",
                path.display(),
                e
            );
            None
        }
    }
}

/// Mark a file executable (rwxr-xr-x).
pub(crate) fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_digest_known_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            file_digest(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_digest_missing_file() {
        assert!(file_digest(Path::new("/nonexistent/stage0")).is_none());
    }

    #[test]
    fn test_delegated_flag_follows_kind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stage1");
        fs::write(&path, "#!/bin/sh\n").unwrap();

        let direct = CompilerArtifact::new(Stage::Stage1, path.clone(), ArtifactKind::Direct, String::new());
        assert!(!direct.delegated());
        assert!(direct.is_built());
        assert_eq!(direct.short_digest().len(), 16);

        let delegated = CompilerArtifact::new(
            Stage::Stage1,
            path,
            ArtifactKind::Delegated {
                target: temp.path().join("stage0"),
            },
            String::new(),
        );
        assert!(delegated.delegated());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Stage0.file_name(), "stage0");
        assert_eq!(Stage::Stage1.to_string(), "Stage 1");
        assert_eq!(Stage::Stage1.build_log_name(), "build-stage1");
    }
}
