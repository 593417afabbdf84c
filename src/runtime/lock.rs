//! Advisory file locks guarding package directories.

use anyhow::{Context, Result};
use fs2::FileExt;
use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use super::RealRuntime;

/// An exclusive lock on a lock file, released on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: Option<File>,
}

impl FileLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            debug!("Releasing lock {:?}", self.path);
            let _ = FileExt::unlock(&file);
        }
    }
}

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn lock_exclusive_impl(&self, path: &Path) -> Result<FileLock> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file {:?}", path))?;

        if file.try_lock_exclusive().is_err() {
            info!("Waiting for another process to release {:?}...", path);
            file.lock_exclusive()
                .with_context(|| format!("Failed to lock {:?}", path))?;
        }

        debug!("Acquired lock {:?}", path);
        Ok(FileLock {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }
}
