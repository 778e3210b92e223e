//! Scoped scratch files.
//!
//! Every intermediate file this crate writes goes through [`ScratchFile`], which
//! deletes it on drop unless it was promoted to its final location.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Collision-free sibling path for `target`: `.<stem>-<timestamp>-<uuid>.<ext>`.
///
/// The extension is kept so format-sniffing encoders still pick the right codec.
pub fn unique_scratch_path(target: &Path) -> PathBuf {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = target
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scratch");
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    let name = match target.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{stem}-{stamp}-{}.{ext}", Uuid::new_v4().simple()),
        None => format!(".{stem}-{stamp}-{}", Uuid::new_v4().simple()),
    };
    dir.join(name)
}

/// A file that is removed when the guard goes out of scope.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    /// Reserves a scratch path next to `target`. Nothing is created on disk yet.
    pub fn beside(target: &Path) -> Self {
        Self {
            path: unique_scratch_path(target),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically moves the scratch file onto `destination`.
    ///
    /// On failure the guard stays armed and the scratch file is still removed.
    pub fn persist_to(mut self, destination: &Path) -> anyhow::Result<()> {
        fs::rename(&self.path, destination).with_context(|| {
            format!(
                "renaming {} to {}",
                self.path.display(),
                destination.display()
            )
        })?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch file"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scratch_paths_are_unique_and_keep_extension() {
        let target = Path::new("/tmp/out/aligned.png");
        let a = unique_scratch_path(target);
        let b = unique_scratch_path(target);
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/tmp/out")));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("png"));
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with(".aligned-"));
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        let path = unique_scratch_path(Path::new("aligned.png"));
        assert_eq!(path.parent(), Some(Path::new(".")));
    }

    #[test]
    fn test_dropped_guard_removes_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.png");
        let scratch = ScratchFile::beside(&target);
        fs::write(scratch.path(), b"partial").unwrap();
        let path = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn test_persist_moves_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.png");
        let scratch = ScratchFile::beside(&target);
        fs::write(scratch.path(), b"done").unwrap();
        scratch.persist_to(&target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"done");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_persist_still_cleans_up() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("taken");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();
        let scratch = ScratchFile::beside(&dir.path().join("out.png"));
        fs::write(scratch.path(), b"data").unwrap();
        assert!(scratch.persist_to(&blocker).is_err());
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }
}
