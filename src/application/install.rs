//! Install use case - orchestrates the package installation flow.
//!
//! For each requested name:
//! - search the repositories for the best match
//! - resolve its dependency closure in the same repository
//! - drop everything that is already installed
//! - stage, extract and commit the rest, dependencies first

use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info, warn};

use crate::archive::{ArchiveExtractor, PackageExtractor};
use crate::cleanup::{SharedCleanupContext, StagingGuard, new_shared};
use crate::context::RequestContext;
use crate::error::{ResourceError, ResourceResult};
use crate::feed::{FeedClient, FeedRegistry};
use crate::package::{
    Meta, PackageId, PackageIdentity, PackageRepository, ResourceMetadata, VersionConstraint,
    Versioned,
};
use crate::registry::{RepositoryDescriptor, filter_repositories};
use crate::resolver::{DependencyResolver, Resolution};
use crate::runtime::Runtime;
use crate::search::{SearchCoordinator, SearchRequest};

/// Files and directories a `.nupkg` carries for its own packaging, not content.
const PACKAGING_FILE_SUFFIXES: [&str; 2] = [".nupkg.sha512", ".nupkg.metadata"];
const PACKAGING_FILES: [&str; 1] = ["[content_types].xml"];
const PACKAGING_DIRS: [&str; 2] = ["_rels", "package"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub name: String,
    /// Raw version text; `None` installs the latest stable version.
    pub version: Option<String>,
}

impl InstallRequest {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub include_prerelease: bool,
    /// Install again even when the selected version is present.
    pub reinstall: bool,
    pub skip_dependencies: bool,
    /// Do not ask before installing from an untrusted repository.
    pub trust_repository: bool,
    /// Restrict the search to these repositories. Empty means all.
    pub repositories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstallStatus {
    /// Packages written to disk, dependencies first, requested package last.
    Installed { installed: Vec<PackageIdentity> },
    AlreadyInstalled(PackageIdentity),
    NotFound,
    /// `installed` lists the dependencies committed before the failure.
    /// They stay on disk.
    Failed {
        reason: String,
        installed: Vec<PackageIdentity>,
    },
}

impl InstallStatus {
    fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            installed: Vec::new(),
        }
    }
}

/// Outcome for one requested name.
#[derive(Debug)]
pub struct InstallReport {
    pub name: String,
    pub status: InstallStatus,
    /// Recovered problems: unavailable repositories and unresolved dependencies.
    pub issues: Vec<ResourceError>,
}

impl InstallReport {
    fn new(name: &str, status: InstallStatus, issues: Vec<ResourceError>) -> Self {
        Self {
            name: name.to_string(),
            status,
            issues,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            InstallStatus::Installed { .. } | InstallStatus::AlreadyInstalled(_)
        )
    }
}

/// Install use case - search, resolve and install against the local store.
pub struct InstallUseCase<'a, R: Runtime> {
    runtime: &'a R,
    package_repo: PackageRepository<'a, R>,
    feeds: &'a FeedRegistry,
    repositories: Vec<RepositoryDescriptor>,
    extractor: PackageExtractor,
    cleanup: SharedCleanupContext,
}

impl<'a, R: Runtime> InstallUseCase<'a, R> {
    /// `repositories` must already be in priority order.
    pub fn new(
        runtime: &'a R,
        feeds: &'a FeedRegistry,
        repositories: Vec<RepositoryDescriptor>,
        install_root: PathBuf,
    ) -> Self {
        Self {
            runtime,
            package_repo: PackageRepository::new(runtime, install_root),
            feeds,
            repositories,
            extractor: PackageExtractor,
            cleanup: new_shared(),
        }
    }

    /// Track staging directories in `cleanup` so an interrupt handler can remove them.
    pub fn with_cleanup(mut self, cleanup: SharedCleanupContext) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Install every request. Only configuration errors and cancellation
    /// fail the whole call; everything else is reported per name.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn install(
        &self,
        ctx: &RequestContext,
        requests: &[InstallRequest],
        options: &InstallOptions,
    ) -> ResourceResult<Vec<InstallReport>> {
        let repositories = filter_repositories(self.repositories.clone(), &options.repositories)?;

        let mut reports = Vec::with_capacity(requests.len());
        for request in requests {
            ctx.check()?;
            let report = match self.install_one(ctx, request, options, &repositories).await {
                Ok(report) => report,
                Err(e) if e.is_cancelled() || matches!(e, ResourceError::Configuration(_)) => {
                    return Err(e);
                }
                Err(e) => {
                    InstallReport::new(&request.name, InstallStatus::failed(e.to_string()), Vec::new())
                }
            };
            match &report.status {
                InstallStatus::Installed { installed } => {
                    info!("Installed {} package(s) for {}", installed.len(), request.name)
                }
                InstallStatus::AlreadyInstalled(identity) => {
                    info!("{} is already installed", identity)
                }
                InstallStatus::NotFound => warn!("{} was not found", request.name),
                InstallStatus::Failed { reason, installed } => {
                    warn!("{} failed: {}", request.name, reason);
                    for identity in installed {
                        warn!("{} was installed before the failure and is kept", identity);
                    }
                }
            }
            reports.push(report);
        }
        Ok(reports)
    }

    async fn install_one(
        &self,
        ctx: &RequestContext,
        request: &InstallRequest,
        options: &InstallOptions,
        repositories: &[RepositoryDescriptor],
    ) -> ResourceResult<InstallReport> {
        let name = request.name.as_str();
        if PackageId::is_pattern(name) {
            return Ok(InstallReport::new(
                name,
                InstallStatus::failed("wildcard names cannot be installed"),
                Vec::new(),
            ));
        }

        let constraint = match VersionConstraint::parse_optional(request.version.as_deref()) {
            Ok(constraint) => constraint,
            Err(e) => {
                return Ok(InstallReport::new(name, InstallStatus::failed(e.to_string()), Vec::new()));
            }
        };

        let search = SearchRequest {
            names: vec![name.to_string()],
            version: request.version.clone(),
            include_prerelease: options.include_prerelease,
            ..Default::default()
        };
        let outcome = SearchCoordinator::new(self.feeds)
            .search(ctx, &search, repositories)
            .await?;
        let mut issues = outcome.unavailable;

        let Some(primary) = outcome.results.into_iter().next() else {
            return Ok(InstallReport::new(name, InstallStatus::NotFound, issues));
        };

        if !options.reinstall {
            match self.installed_match(&primary, &constraint) {
                Ok(Some(installed)) => {
                    debug!("{} satisfies the request for {}", installed, name);
                    return Ok(InstallReport::new(
                        name,
                        InstallStatus::AlreadyInstalled(installed),
                        issues,
                    ));
                }
                Ok(None) => {}
                Err(e) => {
                    return Ok(InstallReport::new(name, InstallStatus::failed(e.to_string()), issues));
                }
            }
        }

        let Some(feed) = self.feeds.get(&primary.repository) else {
            return Ok(InstallReport::new(
                name,
                InstallStatus::failed(format!("repository '{}' is not available", primary.repository)),
                issues,
            ));
        };

        let resolution = if options.skip_dependencies {
            Resolution {
                packages: vec![primary.clone()],
                ..Default::default()
            }
        } else {
            DependencyResolver::new(feed.as_ref(), options.include_prerelease)
                .resolve(ctx, &primary)
                .await?
        };
        issues.extend(resolution.unresolved.iter().map(clone_unresolved));

        let plan = match self.plan(&resolution, options) {
            Ok(plan) => plan,
            Err(e) => {
                return Ok(InstallReport::new(name, InstallStatus::failed(e.to_string()), issues));
            }
        };
        if plan.is_empty() {
            return Ok(InstallReport::new(
                name,
                InstallStatus::AlreadyInstalled(primary.identity.clone()),
                issues,
            ));
        }

        let Some(descriptor) = repositories
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(&primary.repository))
        else {
            return Ok(InstallReport::new(
                name,
                InstallStatus::failed(format!("repository '{}' is not registered", primary.repository)),
                issues,
            ));
        };

        if let Err(reason) = self.check_trust(descriptor, options) {
            return Ok(InstallReport::new(name, InstallStatus::failed(reason), issues));
        }

        let mut installed = Vec::with_capacity(plan.len());
        for metadata in plan {
            ctx.check()?;
            let feed = self.feeds.get(&metadata.repository).unwrap_or_else(|| feed.clone());
            match self
                .install_package(ctx, feed.as_ref(), &metadata, &descriptor.url)
                .await
            {
                Ok(path) => {
                    info!("Installed {} to {:?}", metadata.identity, path);
                    installed.push(metadata.identity.clone());
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    return Ok(InstallReport::new(
                        name,
                        InstallStatus::Failed {
                            reason: format!("{}: {}", metadata.identity, e),
                            installed,
                        },
                        issues,
                    ));
                }
            }
        }

        Ok(InstallReport::new(
            name,
            InstallStatus::Installed { installed },
            issues,
        ))
    }

    /// The installed version that makes installing `primary` unnecessary:
    /// the selected version itself, or any installed version inside an
    /// explicit requested range.
    fn installed_match(
        &self,
        primary: &ResourceMetadata,
        constraint: &VersionConstraint,
    ) -> ResourceResult<Option<PackageIdentity>> {
        let installed = self.installed_versions(primary.id())?;

        if installed.iter().any(|m| m.version() == primary.version()) {
            return Ok(Some(primary.identity.clone()));
        }
        if constraint.is_explicit() {
            return Ok(installed
                .iter()
                .filter(|m| constraint.satisfies(m.version()))
                .max_by(|a, b| a.version().cmp(b.version()))
                .map(Meta::identity));
        }
        Ok(None)
    }

    /// Packages still to install, dependencies first and the root last.
    fn plan(
        &self,
        resolution: &Resolution,
        options: &InstallOptions,
    ) -> ResourceResult<Vec<ResourceMetadata>> {
        let mut plan = Vec::new();
        let ordered = resolution
            .dependencies()
            .iter()
            .rev()
            .chain(resolution.root());

        for metadata in ordered {
            if !options.reinstall {
                let is_root = resolution
                    .root()
                    .is_some_and(|root| root.identity == metadata.identity);
                let constraint = if is_root {
                    VersionConstraint::Exact(metadata.version().clone())
                } else {
                    resolution.constraint_for(metadata.id())
                };
                let installed = self.installed_versions(metadata.id())?;
                let satisfied = installed.iter().any(|m| match &constraint {
                    VersionConstraint::Unconstrained | VersionConstraint::Wildcard => true,
                    other => other.satisfies(m.version()),
                });
                if satisfied {
                    debug!("Skipping {}: already installed", metadata.identity);
                    continue;
                }
            }
            plan.push(metadata.clone());
        }
        Ok(plan)
    }

    fn installed_versions(&self, id: &PackageId) -> ResourceResult<Vec<Meta>> {
        self.package_repo.installed(id).map_err(|e| {
            ResourceError::file_system(self.package_repo.package_dir(id), &e)
        })
    }

    fn check_trust(
        &self,
        descriptor: &RepositoryDescriptor,
        options: &InstallOptions,
    ) -> std::result::Result<(), String> {
        if descriptor.trusted || options.trust_repository {
            return Ok(());
        }
        let prompt = format!(
            "You are installing from an untrusted repository '{}' ({}). Continue?",
            descriptor.name, descriptor.url
        );
        match self.runtime.confirm(&prompt) {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!(
                "installation from untrusted repository '{}' was declined",
                descriptor.name
            )),
            Err(e) => Err(format!("could not confirm repository trust: {:#}", e)),
        }
    }

    /// Download, extract and commit one package under its directory lock.
    #[tracing::instrument(skip(self, ctx, feed, metadata), fields(package = %metadata.identity))]
    async fn install_package(
        &self,
        ctx: &RequestContext,
        feed: &dyn FeedClient,
        metadata: &ResourceMetadata,
        repository_url: &str,
    ) -> ResourceResult<PathBuf> {
        let id = metadata.id();
        let version = metadata.version();
        let lock_path = self.package_repo.lock_path(id);
        let _lock = self
            .package_repo
            .lock(id)
            .map_err(|e| ResourceError::file_system(&lock_path, &e))?;

        let staging = self.package_repo.staging_dir(id, version);
        if self.runtime.exists(&staging) {
            debug!("Removing stale staging directory {:?}", staging);
            self.runtime
                .remove_dir_all(&staging)
                .map_err(|e| ResourceError::file_system(&staging, &e))?;
        }
        let guard = StagingGuard::new(self.cleanup.clone(), staging.clone());

        let result = match self.stage(ctx, feed, metadata, &staging, repository_url).await {
            Ok(()) => self
                .package_repo
                .commit_staging(&staging, id, version)
                .map_err(|e| ResourceError::file_system(&staging, &e)),
            Err(e) => Err(e),
        };

        if result.is_err() && self.runtime.exists(&staging) {
            if let Err(e) = self.runtime.remove_dir_all(&staging) {
                warn!("Failed to remove staging directory {:?}: {:#}", staging, e);
            }
        }
        guard.release();
        self.prune_staging_parent(&staging);
        result
    }

    async fn stage(
        &self,
        ctx: &RequestContext,
        feed: &dyn FeedClient,
        metadata: &ResourceMetadata,
        staging: &Path,
        repository_url: &str,
    ) -> ResourceResult<()> {
        let fs_error = |e: anyhow::Error| ResourceError::file_system(staging, &e);

        ctx.check()?;
        self.runtime.create_dir_all(staging).map_err(fs_error)?;
        let download = feed
            .download(&metadata.identity, staging)
            .await
            .map_err(fs_error)?;
        if download.size == 0 {
            return Err(ResourceError::FileSystem {
                path: download.path,
                reason: "downloaded package is empty".to_string(),
            });
        }

        self.extractor
            .extract(self.runtime, &download.path, staging)
            .map_err(fs_error)?;
        self.runtime.remove_file(&download.path).map_err(fs_error)?;
        if is_nupkg(&download.path) {
            self.remove_packaging_files(staging).map_err(fs_error)?;
        }

        if self.runtime.read_dir(staging).map_err(fs_error)?.is_empty() {
            return Err(ResourceError::FileSystem {
                path: staging.to_path_buf(),
                reason: "package contains no files".to_string(),
            });
        }

        let install_path = self
            .package_repo
            .version_dir(metadata.id(), metadata.version());
        let meta = Meta::from_metadata(metadata, repository_url, install_path, Utc::now());
        self.package_repo.save(&meta, staging).map_err(fs_error)
    }

    fn remove_packaging_files(&self, staging: &Path) -> anyhow::Result<()> {
        for entry in self.runtime.read_dir(staging)? {
            let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = name.to_ascii_lowercase();
            if self.runtime.is_dir(&entry) {
                if PACKAGING_DIRS.contains(&name.as_str()) {
                    debug!("Removing {:?}", entry);
                    self.runtime.remove_dir_all(&entry)?;
                }
            } else if PACKAGING_FILES.contains(&name.as_str())
                || PACKAGING_FILE_SUFFIXES.iter().any(|s| name.ends_with(s))
            {
                debug!("Removing {:?}", entry);
                self.runtime.remove_file(&entry)?;
            }
        }
        Ok(())
    }

    /// `<root>/.staging/<id>` is left behind once its last version moves out.
    fn prune_staging_parent(&self, staging: &Path) {
        if let Some(parent) = staging.parent()
            && self
                .runtime
                .read_dir(parent)
                .is_ok_and(|entries| entries.is_empty())
        {
            let _ = self.runtime.remove_dir(parent);
        }
    }
}

fn is_nupkg(archive_path: &Path) -> bool {
    archive_path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("nupkg"))
}

/// `ResourceError` is not `Clone`; unresolved dependencies carry only strings.
fn clone_unresolved(error: &ResourceError) -> ResourceError {
    match error {
        ResourceError::DependencyUnresolved {
            parent,
            dependency,
            constraint,
            reason,
        } => ResourceError::DependencyUnresolved {
            parent: parent.clone(),
            dependency: dependency.clone(),
            constraint: constraint.clone(),
            reason: reason.clone(),
        },
        other => ResourceError::configuration(other.to_string()),
    }
}
