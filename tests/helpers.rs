//! Shared test utilities for stagecheck tests.
//!
//! Builds a throwaway project with a fake toolchain and a fake compiler,
//! both small shell scripts, so the whole pipeline can run without a real
//! compiler.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use stagecheck::Config;
use tempfile::TempDir;
use walkdir::WalkDir;

/// How the fake compiler handles `bootstrap/compiler.src`.
pub const SELF_BUILD_FIXPOINT: &str = "cp \"$0\" \"$out\"";
pub const SELF_BUILD_DRIFT: &str = "sed 's/fakec 0.1.0/fakec 0.2.0/' \"$0\" > \"$out\"";
pub const SELF_BUILD_BROKEN: &str = "echo 'error: unsupported construct in compiler.src' >&2; exit 1";
/// Stage 1 rejects any source mentioning `sample`, so only it fails the sample.
pub const SELF_BUILD_PICKY: &str = "sed 's/grep -q error/grep -q sample/' \"$0\" > \"$out\"";

/// Fake compiler honouring the verifier's invocation contract.
///
/// Sources containing the word `error` fail to compile.
pub fn compiler_script(self_build: &str) -> String {
    format!(
        r#"#!/bin/sh
case "$1" in
  --version) echo "fakec 0.1.0"; exit 0 ;;
  --self-check) echo "self-check: ok"; exit 0 ;;
esac
src="$1"
out="$3"
[ -f "$src" ] || {{ echo "error: cannot read $src" >&2; exit 1; }}
case "$src" in
  *compiler.src) {self_build} ;;
  *)
    if grep -q error "$src"; then
      echo "error: $(basename "$src"): syntax error" >&2
      exit 1
    fi
    printf '#!/bin/sh\necho "hello from sample"\n' > "$out"
    ;;
esac
chmod +x "$out"
echo "compiled $(basename "$src")"
"#
    )
}

/// Test project with a fake toolchain that "builds" `compiler/compiler.sh`
/// into `compiler/out/compiler`.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Project root
    pub root: PathBuf,
    /// Parent of the per-run work directory
    pub work_root: PathBuf,
    /// Fake toolchain script
    pub toolchain: PathBuf,
    /// Extra configuration overrides
    pub vars: HashMap<String, String>,
}

impl TestEnv {
    /// Project with a working toolchain, a fixpoint compiler, a sample
    /// program and no self-hosted source.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("project");
        let work_root = temp_dir.path().join("work");
        let toolchain = temp_dir.path().join("fake-toolchain");

        fs::create_dir_all(root.join("compiler")).expect("Failed to create compiler dir");
        fs::create_dir_all(root.join("bootstrap")).expect("Failed to create bootstrap dir");

        let env = Self {
            _temp_dir: temp_dir,
            root,
            work_root,
            toolchain,
            vars: HashMap::new(),
        };
        env.set_toolchain("mkdir -p out && cp compiler.sh out/compiler && echo 'Finished release'");
        env.set_compiler(&compiler_script(SELF_BUILD_FIXPOINT));
        env.set_sample("print \"hello from sample\"\n");
        env
    }

    /// Replace the toolchain's script body.
    pub fn set_toolchain(&self, body: &str) {
        write_executable(&self.toolchain, &format!("#!/bin/sh\n{}\n", body));
    }

    /// Replace the compiler the toolchain builds.
    pub fn set_compiler(&self, script: &str) {
        write_executable(&self.root.join("compiler/compiler.sh"), script);
    }

    pub fn set_sample(&self, content: &str) {
        fs::write(self.root.join("bootstrap/sample.src"), content).expect("Failed to write sample");
    }

    pub fn remove_sample(&self) {
        fs::remove_file(self.root.join("bootstrap/sample.src")).expect("Failed to remove sample");
    }

    pub fn add_self_hosted_source(&self) {
        fs::write(self.root.join("bootstrap/compiler.src"), "compiler source\n")
            .expect("Failed to write self-hosted source");
    }

    pub fn set_var(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    pub fn config(&self) -> Config {
        let mut vars = HashMap::new();
        vars.insert(
            "BOOTSTRAP_TOOLCHAIN".to_string(),
            self.toolchain.to_string_lossy().into_owned(),
        );
        vars.insert("BOOTSTRAP_TOOLCHAIN_ARGS".to_string(), String::new());
        vars.insert("BOOTSTRAP_COMPILER_SOURCE".to_string(), "compiler".to_string());
        vars.insert("BOOTSTRAP_STAGE0_OUTPUT".to_string(), "out/compiler".to_string());
        vars.insert(
            "BOOTSTRAP_WORK_ROOT".to_string(),
            self.work_root.to_string_lossy().into_owned(),
        );
        vars.insert("BOOTSTRAP_INVOCATION_TIMEOUT".to_string(), "20".to_string());
        vars.extend(self.vars.clone());
        Config::from_vars(&self.root, &vars).expect("Failed to build config")
    }

    /// Number of entries left under the work root (0 if it doesn't exist).
    pub fn leftover_entries(&self) -> usize {
        WalkDir::new(&self.work_root)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .count()
    }

    /// The run removed everything it created, the work root included.
    pub fn assert_no_leftovers(&self) {
        assert_eq!(self.leftover_entries(), 0, "entries left under work root");
        assert!(
            !self.work_root.exists(),
            "work root {} left behind",
            self.work_root.display()
        );
    }
}

pub fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).expect("Failed to write script");
    let mut perms = fs::metadata(path).expect("Failed to stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to chmod script");
}
