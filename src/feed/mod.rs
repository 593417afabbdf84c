//! Package feeds.
//!
//! A feed answers three questions about one repository: which packages match
//! a search text, which versions of a package exist, and where the package
//! archive for one version can be fetched from. Remote repositories speak a
//! small JSON protocol over HTTP. Local repositories are plain directories.

mod factory;
mod local;
mod registry;
mod remote;
mod wire;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use crate::package::{PackageId, PackageIdentity, ResourceMetadata};
use crate::registry::RepositoryDescriptor;

pub use factory::{FeedFactory, FeedLocation};
pub use local::{LocalDirectoryFeedClient, RESOURCE_FILE};
pub use registry::FeedRegistry;
pub use remote::RemoteFeedClient;
pub use wire::{FeedDependency, FeedDependencyGroup, FeedPackage, SearchPage, Tags};

/// A package archive saved to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub size: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedClient: Send + Sync {
    fn repository(&self) -> &RepositoryDescriptor;

    /// One page of search results, latest version per package.
    async fn search(
        &self,
        text: &str,
        include_prerelease: bool,
        skip: usize,
        take: usize,
    ) -> Result<Vec<ResourceMetadata>>;

    /// Versions of one package. An unknown package yields an empty list.
    /// Without `include_all_versions` only the latest version is returned.
    async fn metadata(
        &self,
        id: &PackageId,
        include_prerelease: bool,
        include_all_versions: bool,
    ) -> Result<Vec<ResourceMetadata>>;

    /// Save the archive of `identity` into the `destination` directory.
    async fn download(&self, identity: &PackageIdentity, destination: &Path)
    -> Result<DownloadResult>;
}
