//! Local store of installed packages.
//!
//! Layout:
//! - `<root>/<id>/<version>/` - installed content plus `meta.json`
//! - `<root>/.staging/<id>/<version>/` - in-flight installs
//! - `<root>/.locks/<id>.lock` - per-package advisory locks

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::runtime::{FileLock, Runtime};

use super::discovery::{find_all_manifests, find_version_manifests};
use super::identity::PackageId;
use super::meta::Meta;
use super::version::ResourceVersion;

pub const MANIFEST_FILE: &str = "meta.json";
const STAGING_DIR: &str = ".staging";
const LOCKS_DIR: &str = ".locks";

/// Repository for managing locally installed packages.
pub struct PackageRepository<'a, R: Runtime> {
    runtime: &'a R,
    install_root: PathBuf,
}

impl<'a, R: Runtime> PackageRepository<'a, R> {
    pub fn new(runtime: &'a R, install_root: PathBuf) -> Self {
        Self {
            runtime,
            install_root,
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Directory holding every installed version of `id`.
    ///
    /// An existing directory whose name matches case-insensitively is reused.
    pub fn package_dir(&self, id: &PackageId) -> PathBuf {
        if let Ok(entries) = self.runtime.read_dir(&self.install_root) {
            for entry in entries {
                if entry
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| id.matches(n))
                {
                    return entry;
                }
            }
        }
        self.install_root.join(id.as_str())
    }

    pub fn version_dir(&self, id: &PackageId, version: &ResourceVersion) -> PathBuf {
        self.package_dir(id).join(version.to_string())
    }

    pub fn staging_dir(&self, id: &PackageId, version: &ResourceVersion) -> PathBuf {
        self.install_root
            .join(STAGING_DIR)
            .join(id.key())
            .join(version.to_string())
    }

    pub fn lock_path(&self, id: &PackageId) -> PathBuf {
        self.install_root
            .join(LOCKS_DIR)
            .join(format!("{}.lock", id.key()))
    }

    /// Serialize work on one package directory across processes.
    pub fn lock(&self, id: &PackageId) -> Result<FileLock> {
        self.runtime.lock_exclusive(&self.lock_path(id))
    }

    /// Manifests of all installed versions of `id`.
    pub fn installed(&self, id: &PackageId) -> Result<Vec<Meta>> {
        let manifests = find_version_manifests(self.runtime, &self.package_dir(id))?;
        Ok(self.load_all(manifests))
    }

    /// Manifests of every installed version of every package.
    pub fn find_all_with_meta(&self) -> Result<Vec<Meta>> {
        let manifests = find_all_manifests(self.runtime, &self.install_root)?;
        Ok(self.load_all(manifests))
    }

    /// Like [`Self::find_all_with_meta`], but any manifest that cannot be
    /// read or parsed fails the call. The error names every such manifest.
    pub fn find_all_with_meta_strict(&self) -> Result<Vec<Meta>> {
        let manifests = find_all_manifests(self.runtime, &self.install_root)?;
        let mut results = Vec::with_capacity(manifests.len());
        let mut unreadable = Vec::new();
        for path in manifests {
            match Meta::load(self.runtime, &path) {
                Ok(meta) => results.push(meta),
                Err(e) => {
                    warn!("Failed to load manifest from {:?}: {:#}", path, e);
                    unreadable.push(path.display().to_string());
                }
            }
        }
        if !unreadable.is_empty() {
            bail!("unreadable manifests: {}", unreadable.join(", "));
        }
        Ok(results)
    }

    fn load_all(&self, manifests: Vec<PathBuf>) -> Vec<Meta> {
        let mut results = Vec::with_capacity(manifests.len());
        for path in manifests {
            match Meta::load(self.runtime, &path) {
                Ok(meta) => results.push(meta),
                Err(e) => warn!("Failed to load manifest from {:?}: {:#}", path, e),
            }
        }
        results
    }

    pub fn save(&self, meta: &Meta, dir: &Path) -> Result<()> {
        meta.save(self.runtime, &dir.join(MANIFEST_FILE))
    }

    /// Move a fully prepared staging directory into its final location,
    /// replacing any existing install of the same version.
    pub fn commit_staging(&self, staging: &Path, id: &PackageId, version: &ResourceVersion) -> Result<PathBuf> {
        let target = self.version_dir(id, version);
        if self.runtime.exists(&target) {
            debug!("Replacing existing install at {:?}", target);
            self.runtime.remove_dir_all(&target)?;
        }
        if let Some(parent) = target.parent() {
            self.runtime.create_dir_all(parent)?;
        }
        self.runtime
            .rename(staging, &target)
            .with_context(|| format!("Failed to move {:?} into {:?}", staging, target))?;
        Ok(target)
    }

    /// Remove a specific version directory.
    pub fn remove_version_dir(&self, id: &PackageId, version: &ResourceVersion) -> Result<()> {
        let version_dir = self.version_dir(id, version);
        if self.runtime.exists(&version_dir) {
            debug!("Removing version directory {:?}", version_dir);
            self.runtime.remove_dir_all(&version_dir)?;
        }
        Ok(())
    }

    /// Remove the package directory if nothing is left in it.
    /// Returns true if the directory was removed.
    pub fn remove_package_dir_if_empty(&self, id: &PackageId) -> Result<bool> {
        let package_dir = self.package_dir(id);
        if !self.runtime.exists(&package_dir) {
            return Ok(false);
        }
        if self.runtime.read_dir(&package_dir)?.is_empty() {
            debug!("Removing empty package directory {:?}", package_dir);
            self.runtime.remove_dir(&package_dir)?;
            return Ok(true);
        }
        Ok(false)
    }
}
