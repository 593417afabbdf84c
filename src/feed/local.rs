//! Feed backed by a directory tree: `<feed>/<id>/<version>/resource.json`
//! plus the package archive next to it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use glob::Pattern;
use log::{debug, warn};

use super::wire::FeedPackage;
use super::{DownloadResult, FeedClient};
use crate::package::{
    PackageId, PackageIdentity, ResourceMetadata, ResourceVersion, VersionConstraint,
    VersionSelector,
};
use crate::registry::RepositoryDescriptor;
use crate::runtime::Runtime;
use crate::search::CASE_INSENSITIVE;

pub const RESOURCE_FILE: &str = "resource.json";

const ARCHIVE_SUFFIXES: [&str; 4] = [".nupkg", ".zip", ".tar.gz", ".tgz"];

pub struct LocalDirectoryFeedClient<R: Runtime> {
    runtime: Arc<R>,
    descriptor: RepositoryDescriptor,
    root: PathBuf,
}

impl<R: Runtime> LocalDirectoryFeedClient<R> {
    pub fn new(runtime: Arc<R>, descriptor: RepositoryDescriptor, root: PathBuf) -> Self {
        Self {
            runtime,
            descriptor,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_name(path: &Path) -> Option<&str> {
        path.file_name().and_then(|n| n.to_str())
    }

    fn package_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.runtime.is_dir(&self.root) {
            return Err(anyhow!("Feed directory {:?} does not exist", self.root));
        }
        let mut dirs: Vec<PathBuf> = self
            .runtime
            .read_dir(&self.root)?
            .into_iter()
            .filter(|p| self.runtime.is_dir(p))
            .filter(|p| Self::dir_name(p).is_some_and(|n| !n.starts_with('.')))
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    fn find_package_dir(&self, id: &PackageId) -> Result<Option<PathBuf>> {
        Ok(self
            .package_dirs()?
            .into_iter()
            .find(|p| Self::dir_name(p).is_some_and(|n| id.matches(n))))
    }

    /// Every readable version of one package, in directory order.
    fn load_versions(&self, package_dir: &Path) -> Result<Vec<(PathBuf, ResourceMetadata)>> {
        let mut versions = Vec::new();
        let mut entries = self.runtime.read_dir(package_dir)?;
        entries.sort();

        for version_dir in entries {
            let manifest = version_dir.join(RESOURCE_FILE);
            if !self.runtime.exists(&manifest) {
                continue;
            }
            match self.load_manifest(&manifest) {
                Ok(metadata) => versions.push((version_dir, metadata)),
                Err(e) => warn!("Skipping {:?}: {:#}", manifest, e),
            }
        }
        Ok(versions)
    }

    fn load_manifest(&self, path: &Path) -> Result<ResourceMetadata> {
        let content = self.runtime.read_to_string(path)?;
        let package: FeedPackage = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        package.into_metadata(&self.descriptor.name)
    }

    fn find_archive(&self, version_dir: &Path) -> Result<PathBuf> {
        let mut entries = self.runtime.read_dir(version_dir)?;
        entries.sort();
        entries
            .into_iter()
            .find(|p| {
                Self::dir_name(p).is_some_and(|n| {
                    let lower = n.to_ascii_lowercase();
                    ARCHIVE_SUFFIXES.iter().any(|s| lower.ends_with(s))
                })
            })
            .ok_or_else(|| anyhow!("No package archive found in {:?}", version_dir))
    }

    fn matches_text(text: &str, metadata: &ResourceMetadata) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return true;
        }
        if PackageId::is_pattern(text) {
            return Pattern::new(text)
                .map(|p| p.matches_with(metadata.id().as_str(), CASE_INSENSITIVE))
                .unwrap_or(false);
        }
        let needle = text.to_ascii_lowercase();
        metadata.id().key().contains(&needle)
            || metadata
                .tags()
                .iter()
                .any(|t| t.to_ascii_lowercase().contains(&needle))
    }
}

#[async_trait]
impl<R: Runtime + 'static> FeedClient for LocalDirectoryFeedClient<R> {
    fn repository(&self) -> &RepositoryDescriptor {
        &self.descriptor
    }

    #[tracing::instrument(skip(self))]
    async fn search(
        &self,
        text: &str,
        include_prerelease: bool,
        skip: usize,
        take: usize,
    ) -> Result<Vec<ResourceMetadata>> {
        let mut latest = Vec::new();
        for package_dir in self.package_dirs()? {
            let versions: Vec<ResourceMetadata> = self
                .load_versions(&package_dir)?
                .into_iter()
                .map(|(_, m)| m)
                .collect();
            if let Some(best) = VersionSelector::best(
                &versions,
                &VersionConstraint::Unconstrained,
                include_prerelease,
            ) && Self::matches_text(text, &best)
            {
                latest.push(best);
            }
        }
        debug!("'{}' matched {} packages in {:?}", text, latest.len(), self.root);
        Ok(latest.into_iter().skip(skip).take(take).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn metadata(
        &self,
        id: &PackageId,
        include_prerelease: bool,
        include_all_versions: bool,
    ) -> Result<Vec<ResourceMetadata>> {
        let Some(package_dir) = self.find_package_dir(id)? else {
            debug!("{} not found in {:?}", id, self.root);
            return Ok(Vec::new());
        };

        let versions: Vec<ResourceMetadata> = self
            .load_versions(&package_dir)?
            .into_iter()
            .map(|(_, m)| m)
            .collect();

        let constraint = if include_all_versions {
            VersionConstraint::Wildcard
        } else {
            VersionConstraint::Unconstrained
        };
        Ok(VersionSelector::select(&versions, &constraint, include_prerelease))
    }

    #[tracing::instrument(skip(self))]
    async fn download(
        &self,
        identity: &PackageIdentity,
        destination: &Path,
    ) -> Result<DownloadResult> {
        let package_dir = self
            .find_package_dir(&identity.id)?
            .ok_or_else(|| anyhow!("Package {} not found in {:?}", identity.id, self.root))?;

        let version_dir = self
            .runtime
            .read_dir(&package_dir)?
            .into_iter()
            .find(|p| {
                Self::dir_name(p)
                    .and_then(|n| ResourceVersion::parse(n).ok())
                    .is_some_and(|v| v == identity.version)
            })
            .ok_or_else(|| anyhow!("Version {} not found in {:?}", identity, package_dir))?;

        let archive = self.find_archive(&version_dir)?;
        let file_name = archive
            .file_name()
            .ok_or_else(|| anyhow!("Invalid archive path {:?}", archive))?;
        let target = destination.join(file_name);

        self.runtime.create_dir_all(destination)?;
        let mut reader = self.runtime.open(&archive)?;
        let mut writer = self.runtime.create_file(&target)?;
        let size = std::io::copy(&mut reader, &mut writer)
            .with_context(|| format!("Failed to copy {:?} to {:?}", archive, target))?;

        debug!("Copied {:?} ({} bytes) to {:?}", archive, size, target);
        Ok(DownloadResult { path: target, size })
    }
}
