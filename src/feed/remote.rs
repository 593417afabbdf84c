//! HTTP feed client.
//!
//! Endpoints, relative to the repository URL:
//! - `GET /search?q=&prerelease=&skip=&take=` returns a [`SearchPage`]
//! - `GET /packages/{id}?prerelease=&allVersions=` returns the package versions
//! - `GET /packages/{id}/{version}/download` returns the package archive

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};

use super::wire::{FeedPackage, SearchPage};
use super::{DownloadResult, FeedClient};
use crate::http::HttpClient;
use crate::package::{PackageId, PackageIdentity, ResourceMetadata};
use crate::registry::RepositoryDescriptor;
use crate::runtime::Runtime;

pub struct RemoteFeedClient<R: Runtime> {
    runtime: Arc<R>,
    descriptor: RepositoryDescriptor,
    http_client: HttpClient,
    base_url: String,
}

impl<R: Runtime> RemoteFeedClient<R> {
    pub fn new(runtime: Arc<R>, descriptor: RepositoryDescriptor, http_client: HttpClient) -> Self {
        let base_url = descriptor.url.trim_end_matches('/').to_string();
        Self {
            runtime,
            descriptor,
            http_client,
            base_url,
        }
    }

    fn package_url(&self, id: &PackageId) -> String {
        format!("{}/packages/{}", self.base_url, id)
    }

    fn convert(&self, packages: Vec<FeedPackage>) -> Result<Vec<ResourceMetadata>> {
        packages
            .into_iter()
            .map(|p| p.into_metadata(&self.descriptor.name))
            .collect()
    }
}

#[async_trait]
impl<R: Runtime + 'static> FeedClient for RemoteFeedClient<R> {
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
        let url = format!("{}/search", self.base_url);
        let prerelease = include_prerelease.to_string();
        let skip = skip.to_string();
        let take = take.to_string();

        let page: SearchPage = self
            .http_client
            .get_json(
                &url,
                &[
                    ("q", text),
                    ("prerelease", &prerelease),
                    ("skip", &skip),
                    ("take", &take),
                ],
            )
            .await
            .with_context(|| format!("Search for '{}' failed on {}", text, self.descriptor.name))?;

        debug!(
            "{} returned {} of {} packages for '{}'",
            self.descriptor.name,
            page.packages.len(),
            page.total,
            text
        );
        self.convert(page.packages)
    }

    #[tracing::instrument(skip(self))]
    async fn metadata(
        &self,
        id: &PackageId,
        include_prerelease: bool,
        include_all_versions: bool,
    ) -> Result<Vec<ResourceMetadata>> {
        let prerelease = include_prerelease.to_string();
        let all_versions = include_all_versions.to_string();

        let packages: Option<Vec<FeedPackage>> = self
            .http_client
            .get_json_optional(
                &self.package_url(id),
                &[("prerelease", &prerelease), ("allVersions", &all_versions)],
            )
            .await
            .with_context(|| format!("Failed to fetch {} from {}", id, self.descriptor.name))?;

        self.convert(packages.unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    async fn download(
        &self,
        identity: &PackageIdentity,
        destination: &Path,
    ) -> Result<DownloadResult> {
        let url = format!(
            "{}/{}/download",
            self.package_url(&identity.id),
            identity.version
        );
        let path = destination.join(format!("{}.{}.nupkg", identity.id, identity.version));

        self.runtime.create_dir_all(destination)?;
        info!("Downloading {} from {}", identity, self.descriptor.name);
        let size = self
            .http_client
            .download(&url, || {
                self.runtime
                    .create_file(&path)
                    .with_context(|| format!("Failed to create {:?}", path))
            })
            .await
            .with_context(|| format!("Failed to download {} from {}", identity, self.descriptor.name))?;
        debug!("Downloaded {} bytes to {:?}", size, path);

        Ok(DownloadResult { path, size })
    }
}
