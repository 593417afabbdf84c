//! Uninstall use case - removes installed versions from the local store.
//!
//! Only the local installed state is consulted. Nothing is deleted when
//! another installed package still declares a dependency on the target, or
//! when an installed manifest cannot be read.

use std::path::PathBuf;

use log::{debug, info};

use crate::context::RequestContext;
use crate::error::{ResourceError, ResourceResult};
use crate::package::{Meta, PackageId, PackageRepository, ResourceVersion, VersionConstraint};
use crate::runtime::Runtime;

#[derive(Debug, Clone, Default)]
pub struct UninstallRequest {
    pub name: String,
    pub version: Option<String>,
    /// Only consider installed prerelease versions.
    pub prerelease_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UninstallOptions {
    /// Remove even when other installed packages depend on the target.
    pub skip_dependency_check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallOutcome {
    NotInstalled,
    NoMatchingVersion,
    PartiallyRemoved {
        removed: Vec<ResourceVersion>,
        remaining: Vec<ResourceVersion>,
    },
    FullyRemoved {
        removed: Vec<ResourceVersion>,
    },
}

pub struct UninstallUseCase<'a, R: Runtime> {
    package_repo: PackageRepository<'a, R>,
}

impl<'a, R: Runtime> UninstallUseCase<'a, R> {
    pub fn new(runtime: &'a R, install_root: PathBuf) -> Self {
        Self {
            package_repo: PackageRepository::new(runtime, install_root),
        }
    }

    #[tracing::instrument(skip(self, ctx))]
    pub fn uninstall(
        &self,
        ctx: &RequestContext,
        request: &UninstallRequest,
        options: &UninstallOptions,
    ) -> ResourceResult<UninstallOutcome> {
        ctx.check()?;
        let id = PackageId::new(request.name.as_str());
        let constraint = VersionConstraint::parse_optional(request.version.as_deref())?;

        let installed = self
            .package_repo
            .installed(&id)
            .map_err(|e| ResourceError::file_system(self.package_repo.package_dir(&id), &e))?;
        if installed.is_empty() {
            debug!("{} is not installed", id);
            return Ok(UninstallOutcome::NotInstalled);
        }

        let targets = select_targets(&installed, &constraint, request.prerelease_only);
        if targets.is_empty() {
            debug!("No installed version of {} matches {}", id, constraint.describe());
            return Ok(UninstallOutcome::NoMatchingVersion);
        }

        if !options.skip_dependency_check {
            self.check_dependents(&id)?;
        }

        ctx.check()?;
        let lock_path = self.package_repo.lock_path(&id);
        let _lock = self
            .package_repo
            .lock(&id)
            .map_err(|e| ResourceError::file_system(&lock_path, &e))?;

        let mut removed = Vec::with_capacity(targets.len());
        for version in &targets {
            self.package_repo
                .remove_version_dir(&id, version)
                .map_err(|e| {
                    ResourceError::file_system(self.package_repo.version_dir(&id, version), &e)
                })?;
            info!("Removed {} {}", id, version);
            removed.push(version.clone());
        }

        let remaining: Vec<ResourceVersion> = installed
            .iter()
            .map(|m| m.version.clone())
            .filter(|v| !removed.contains(v))
            .collect();

        if remaining.is_empty() {
            self.package_repo
                .remove_package_dir_if_empty(&id)
                .map_err(|e| ResourceError::file_system(self.package_repo.package_dir(&id), &e))?;
            Ok(UninstallOutcome::FullyRemoved { removed })
        } else {
            Ok(UninstallOutcome::PartiallyRemoved { removed, remaining })
        }
    }

    /// Fails with the list of installed packages that declare a dependency on `id`.
    /// A manifest that cannot be read might be one of them, so it fails too.
    fn check_dependents(&self, id: &PackageId) -> ResourceResult<()> {
        let all = self.package_repo.find_all_with_meta_strict().map_err(|e| {
            ResourceError::file_system(self.package_repo.install_root().to_path_buf(), &e)
        })?;

        let blockers: Vec<String> = all
            .iter()
            .filter(|meta| meta.name != *id && meta.depends_on(id))
            .map(|meta| format!("{} {}", meta.name, meta.version))
            .collect();

        if blockers.is_empty() {
            return Ok(());
        }
        Err(ResourceError::DependencyConflict {
            target: id.to_string(),
            blockers,
        })
    }
}

/// Versions to remove. Without a version or prerelease filter only the most
/// recently installed version is chosen.
fn select_targets(
    installed: &[Meta],
    constraint: &VersionConstraint,
    prerelease_only: bool,
) -> Vec<ResourceVersion> {
    let candidates: Vec<&Meta> = installed
        .iter()
        .filter(|m| !prerelease_only || m.version.is_prerelease())
        .filter(|m| constraint.satisfies(&m.version))
        .collect();

    if matches!(constraint, VersionConstraint::Unconstrained) && !prerelease_only {
        return candidates
            .into_iter()
            .max_by(|a, b| {
                a.installed_at
                    .cmp(&b.installed_at)
                    .then_with(|| a.version.cmp(&b.version))
            })
            .map(|m| vec![m.version.clone()])
            .unwrap_or_default();
    }

    let mut versions: Vec<ResourceVersion> =
        candidates.into_iter().map(|m| m.version.clone()).collect();
    versions.sort_by(|a, b| b.cmp(a));
    versions.dedup();
    versions
}
