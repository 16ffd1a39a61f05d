// dbimporter/src/restore/workspace.rs
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::{Builder as TempDirBuilder, TempDir};

use crate::errors::{CleanupWarning, ImportError, Result};

/// Prefix of every scratch directory. A random suffix is appended per run.
pub const WORKSPACE_PREFIX: &str = "backup_";

/// Fixed name of the decompressed output inside a workspace.
pub const EXTRACTION_DESTINATION: &str = "backup.sql";

/// Local scratch storage for a single import run.
///
/// Owns the downloaded archive and the extraction destination. Call
/// [`ScratchWorkspace::cleanup`] to remove everything and collect warnings;
/// if the value is dropped without it (unwinding), the directory is removed
/// on drop and failures are logged.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: Option<TempDir>,
    root: PathBuf,
    archive_path: Option<PathBuf>,
}

impl ScratchWorkspace {
    /// Creates `<scratch_root>/backup_XXXXXXXXXX`.
    pub fn acquire(scratch_root: &Path) -> Result<Self> {
        fs::create_dir_all(scratch_root).map_err(|source| ImportError::Scratch {
            path: scratch_root.to_path_buf(),
            source,
        })?;

        let dir = TempDirBuilder::new()
            .prefix(WORKSPACE_PREFIX)
            .rand_bytes(10)
            .tempdir_in(scratch_root)
            .map_err(|source| ImportError::Scratch {
                path: scratch_root.to_path_buf(),
                source,
            })?;

        let root = dir.path().to_path_buf();
        tracing::debug!("Acquired scratch workspace {}", root.display());
        Ok(ScratchWorkspace {
            dir: Some(dir),
            root,
            archive_path: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the extractor deposits its output, a file or a directory.
    pub fn destination(&self) -> PathBuf {
        self.root.join(EXTRACTION_DESTINATION)
    }

    /// Stores the downloaded archive as `backup.<extension>`.
    pub fn write_archive(&mut self, extension: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.root.join(format!("backup.{}", extension));
        // Record before writing so a partial file is still cleaned up.
        self.archive_path = Some(path.clone());
        fs::write(&path, bytes).map_err(|source| ImportError::Scratch {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Removes the extraction destination, the downloaded archive and the
    /// workspace directory itself. Paths that are already gone are ignored.
    pub fn cleanup(mut self) -> Vec<CleanupWarning> {
        let mut warnings = Vec::new();

        remove_path(&self.destination(), &mut warnings);
        if let Some(archive) = self.archive_path.take() {
            remove_path(&archive, &mut warnings);
        }
        if let Some(dir) = self.dir.take() {
            if let Err(source) = dir.close() {
                if source.kind() != ErrorKind::NotFound {
                    warnings.push(CleanupWarning {
                        path: self.root.clone(),
                        source,
                    });
                }
            }
        }

        warnings
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                tracing::warn!(
                    "Failed to remove scratch workspace {} on drop: {}",
                    self.root.display(),
                    e
                );
            }
        }
    }
}

/// Removes a file, or a directory tree, recording any failure as a warning.
fn remove_path(path: &Path, warnings: &mut Vec<CleanupWarning>) {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(source) => warnings.push(CleanupWarning {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspaces_are_unique_and_prefixed() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let first = ScratchWorkspace::acquire(scratch.path())?;
        let second = ScratchWorkspace::acquire(scratch.path())?;

        assert_ne!(first.root(), second.root());
        for ws in [&first, &second] {
            let name = ws.root().file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with(WORKSPACE_PREFIX));
            assert!(name.len() > WORKSPACE_PREFIX.len());
            assert_eq!(ws.destination(), ws.root().join("backup.sql"));
        }

        assert!(first.cleanup().is_empty());
        assert!(second.cleanup().is_empty());
        Ok(())
    }

    #[test]
    fn test_acquire_creates_missing_scratch_root() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let nested = scratch.path().join("storage").join("tmp");
        let ws = ScratchWorkspace::acquire(&nested)?;
        assert!(ws.root().starts_with(&nested));
        assert!(ws.cleanup().is_empty());
        Ok(())
    }

    #[test]
    fn test_cleanup_removes_archive_and_destination_tree() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let mut ws = ScratchWorkspace::acquire(scratch.path())?;
        let archive = ws.write_archive("zip", b"PK")?;
        let destination = ws.destination();
        fs::create_dir_all(destination.join("dump/nested"))?;
        fs::write(destination.join("dump/nested/full.sql"), "SELECT 1;")?;
        let root = ws.root().to_path_buf();

        let warnings = ws.cleanup();

        assert!(warnings.is_empty());
        assert!(!archive.exists());
        assert!(!destination.exists());
        assert!(!root.exists());
        Ok(())
    }

    #[test]
    fn test_cleanup_tolerates_missing_files() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let mut ws = ScratchWorkspace::acquire(scratch.path())?;
        let archive = ws.write_archive("gz", b"\x1f\x8b")?;
        fs::remove_file(&archive)?;

        assert!(ws.cleanup().is_empty());
        assert_eq!(fs::read_dir(scratch.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_remove_path_reports_unremovable_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory")?;
        let mut warnings = Vec::new();

        remove_path(&blocker.join("child"), &mut warnings);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, blocker.join("child"));
        assert!(warnings[0].to_string().starts_with("Failed to remove scratch path"));
        assert!(blocker.is_file());
        Ok(())
    }

    #[test]
    fn test_cleanup_collects_warnings_instead_of_failing() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let mut ws = ScratchWorkspace::acquire(scratch.path())?;
        ws.write_archive("gz", b"\x1f\x8b")?;
        let root = ws.root().to_path_buf();
        // The workspace directory turns into a file, so nothing under it resolves.
        fs::remove_dir_all(&root)?;
        fs::write(&root, "blocker")?;

        let warnings = ws.cleanup();

        assert!(warnings.iter().any(|w| w.path == root.join(EXTRACTION_DESTINATION)));
        assert!(warnings.iter().any(|w| w.path == root.join("backup.gz")));
        Ok(())
    }

    #[test]
    fn test_drop_removes_workspace() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let root = {
            let mut ws = ScratchWorkspace::acquire(scratch.path())?;
            ws.write_archive("gz", b"data")?;
            ws.root().to_path_buf()
        };
        assert!(!root.exists());
        Ok(())
    }
}
