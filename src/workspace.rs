//! Transient work directory for one verification run.
//!
//! [`Workspace`] owns every temporary path the run creates: the work
//! directory itself, the `stage0`/`stage1` artifacts, compiled samples and
//! per-check logs. It is registered before anything else happens and the
//! directory is only created on first use, so a run that aborts early
//! leaves nothing behind. [`Workspace::teardown`] removes the whole tree
//! exactly once, along with any parent directories the run had to create;
//! `Drop` runs it if the caller never did.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::artifact::Stage;
use crate::error::CleanupFailure;

const WORK_DIR_PREFIX: &str = "stagecheck-";
const LOG_DIR: &str = "logs";

pub struct Workspace {
    parent: PathBuf,
    dir: Option<TempDir>,
    /// Ancestors of the work directory created by this run, deepest first.
    created_parents: Vec<PathBuf>,
    torn_down: bool,
}

impl Workspace {
    /// Register a workspace under `parent`. Creates nothing yet.
    pub fn new(parent: &Path) -> Self {
        Self {
            parent: parent.to_path_buf(),
            dir: None,
            created_parents: Vec::new(),
            torn_down: false,
        }
    }

    /// Work directory path, if it has been created.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// The work directory, created on first call.
    pub fn dir(&mut self) -> std::io::Result<&Path> {
        if self.torn_down {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "workspace already torn down",
            ));
        }
        if self.dir.is_none() {
            self.create_parent()?;
            let dir = tempfile::Builder::new()
                .prefix(WORK_DIR_PREFIX)
                .tempdir_in(&self.parent)?;
            tracing::debug!(path = %dir.path().display(), "work directory created");
            self.dir = Some(dir);
        }
        // Just populated above.
        Ok(self.dir.as_ref().map(TempDir::path).unwrap_or(&self.parent))
    }

    /// Create the parent directory, remembering which levels were missing.
    fn create_parent(&mut self) -> std::io::Result<()> {
        let missing: Vec<PathBuf> = self
            .parent
            .ancestors()
            .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
            .map(Path::to_path_buf)
            .collect();
        fs::create_dir_all(&self.parent)?;
        if self.created_parents.is_empty() {
            self.created_parents = missing;
        }
        Ok(())
    }

    /// Fixed artifact location for a stage (`stage0` / `stage1`).
    pub fn artifact_path(&mut self, stage: Stage) -> std::io::Result<PathBuf> {
        Ok(self.dir()?.join(stage.file_name()))
    }

    /// Fresh directory the sample program is compiled in by `stage`.
    ///
    /// Both stages compile to the same relative name, each in its own
    /// directory, so compile logs that echo the output path stay comparable.
    pub fn sample_dir(&mut self, stage: Stage) -> std::io::Result<PathBuf> {
        let dir = self.dir()?.join(format!("sample-{}", stage.file_name()));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Log file location; the logs directory is created on demand.
    pub fn log_path(&mut self, name: &str) -> std::io::Result<PathBuf> {
        let logs = self.dir()?.join(LOG_DIR);
        fs::create_dir_all(&logs)?;
        Ok(logs.join(format!("{}.log", name)))
    }

    /// Remove the work directory and everything in it, then any parent
    /// directories this run created.
    ///
    /// Idempotent: only the first call does anything, and it is a no-op if
    /// the directory was never created.
    pub fn teardown(&mut self) -> Result<(), CleanupFailure> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let Some(dir) = self.dir.take() else {
            tracing::debug!("teardown: no work directory was created");
            return self.remove_created_parents();
        };

        let path = dir.path().to_path_buf();
        tracing::debug!(path = %path.display(), "removing work directory");
        dir.close()
            .map_err(|source| CleanupFailure { path, source })?;
        self.remove_created_parents()
    }

    /// Remove the parents `dir()` created. A parent that something else
    /// has written into in the meantime is left alone.
    fn remove_created_parents(&mut self) -> Result<(), CleanupFailure> {
        for path in std::mem::take(&mut self.created_parents) {
            match fs::remove_dir(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed work root"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(_) if dir_has_entries(&path) => {
                    tracing::debug!(path = %path.display(), "work root not empty, kept");
                    return Ok(());
                }
                Err(source) => return Err(CleanupFailure { path, source }),
            }
        }
        Ok(())
    }
}

fn dir_has_entries(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_some())
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            eprintln!("[WARN] {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_nothing_created_until_used() {
        let parent = TempDir::new().unwrap();
        let mut ws = Workspace::new(parent.path());

        assert!(ws.path().is_none());
        assert_eq!(entries(parent.path()), 0);
        ws.teardown().unwrap();
        assert_eq!(entries(parent.path()), 0);
    }

    #[test]
    fn test_artifact_names_are_distinct() {
        let parent = TempDir::new().unwrap();
        let mut ws = Workspace::new(parent.path());

        let s0 = ws.artifact_path(Stage::Stage0).unwrap();
        let s1 = ws.artifact_path(Stage::Stage1).unwrap();
        assert_ne!(s0, s1);
        assert_eq!(s0.file_name().unwrap(), "stage0");
        assert_eq!(s1.file_name().unwrap(), "stage1");
        assert_eq!(s0.parent(), ws.path());

        let d0 = ws.sample_dir(Stage::Stage0).unwrap();
        let d1 = ws.sample_dir(Stage::Stage1).unwrap();
        assert_ne!(d0, d1);
        assert!(d0.is_dir() && d1.is_dir());
    }

    #[test]
    fn test_teardown_removes_everything_once() {
        let parent = TempDir::new().unwrap();
        let mut ws = Workspace::new(parent.path());

        let artifact = ws.artifact_path(Stage::Stage0).unwrap();
        fs::write(&artifact, "binary").unwrap();
        let log = ws.log_path("version").unwrap();
        fs::write(&log, "log").unwrap();
        assert_eq!(entries(parent.path()), 1);

        ws.teardown().unwrap();
        assert_eq!(entries(parent.path()), 0);
        assert!(ws.path().is_none());

        // Second call is a no-op, and the workspace refuses reuse.
        ws.teardown().unwrap();
        assert!(ws.dir().is_err());
    }

    #[test]
    fn test_drop_tears_down() {
        let parent = TempDir::new().unwrap();
        {
            let mut ws = Workspace::new(parent.path());
            fs::write(ws.log_path("runtime").unwrap(), "x").unwrap();
            assert_eq!(entries(parent.path()), 1);
        }
        assert_eq!(entries(parent.path()), 0);
    }

    #[test]
    fn test_parent_created_on_demand_and_removed() {
        let temp = TempDir::new().unwrap();
        let parent = temp.path().join("nested/work");
        let mut ws = Workspace::new(&parent);
        ws.dir().unwrap();
        assert!(parent.is_dir());

        ws.teardown().unwrap();
        assert!(!temp.path().join("nested").exists());
        assert_eq!(entries(temp.path()), 0);
    }

    #[test]
    fn test_created_parent_kept_when_shared() {
        let temp = TempDir::new().unwrap();
        let parent = temp.path().join("nested/work");
        let mut ws = Workspace::new(&parent);
        ws.dir().unwrap();
        fs::write(temp.path().join("nested/other"), "not ours").unwrap();

        ws.teardown().unwrap();
        assert!(!parent.exists());
        assert!(temp.path().join("nested/other").is_file());
    }
}
