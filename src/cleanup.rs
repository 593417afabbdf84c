use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Staging directories and partial downloads that must be removed if the
/// process is interrupted before they are committed.
#[derive(Default)]
pub struct CleanupContext {
    paths: Vec<PathBuf>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn pending(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Removes every registered path and forgets it. Returns how many were
    /// actually deleted.
    pub fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        for path in self.paths.drain(..) {
            debug!("Cleaning up: {:?}", path);
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else if path.exists() {
                std::fs::remove_file(&path)
            } else {
                continue;
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to clean up {:?}: {}", path, e),
            }
        }
        removed
    }
}

pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Locks the shared context. A panic in another holder does not leave the
/// path list in an inconsistent state, so poisoning is ignored.
pub fn lock(ctx: &SharedCleanupContext) -> MutexGuard<'_, CleanupContext> {
    ctx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registers a staging path for the lifetime of an install step. Dropping
/// the guard without [`StagingGuard::release`] leaves the path registered so an
/// interrupt handler can remove it.
pub struct StagingGuard {
    ctx: SharedCleanupContext,
    path: PathBuf,
}

impl StagingGuard {
    pub fn new(ctx: SharedCleanupContext, path: PathBuf) -> Self {
        lock(&ctx).add(path.clone());
        Self { ctx, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The staged content has been moved into place or removed; stop tracking it.
    pub fn release(self) {
        lock(&self.ctx).remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_add_is_idempotent_and_remove() {
        let mut ctx = CleanupContext::new();
        let path = PathBuf::from("/tmp/.staging/pester/5.5.0");

        ctx.add(path.clone());
        ctx.add(path.clone());
        assert_eq!(ctx.pending().len(), 1);

        ctx.remove(&path);
        assert!(ctx.pending().is_empty());
    }

    #[test]
    fn test_cleanup_removes_files_and_dirs() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("Pester.5.5.0.nupkg");
        fs::write(&archive, "zip").unwrap();
        let staging = dir.path().join(".staging").join("pester");
        fs::create_dir_all(staging.join("5.5.0")).unwrap();
        fs::write(staging.join("5.5.0").join("Pester.psd1"), "@{}").unwrap();

        let mut ctx = CleanupContext::new();
        ctx.add(archive.clone());
        ctx.add(staging.clone());
        ctx.add(dir.path().join("never-created"));

        assert_eq!(ctx.cleanup(), 2);
        assert!(!archive.exists());
        assert!(!staging.exists());
        assert!(ctx.pending().is_empty());
    }

    #[test]
    fn test_staging_guard_release_untracks() {
        let ctx = new_shared();
        let guard = StagingGuard::new(Arc::clone(&ctx), PathBuf::from("/tmp/stage"));
        assert_eq!(guard.path(), Path::new("/tmp/stage"));
        assert_eq!(lock(&ctx).pending().len(), 1);

        guard.release();

        assert!(lock(&ctx).pending().is_empty());
    }

    #[test]
    fn test_staging_guard_drop_keeps_path() {
        let ctx = new_shared();
        {
            let _guard = StagingGuard::new(Arc::clone(&ctx), PathBuf::from("/tmp/stage"));
        }
        assert_eq!(lock(&ctx).pending(), &[PathBuf::from("/tmp/stage")]);
    }
}
