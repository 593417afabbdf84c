use std::collections::HashSet;

use glob::Pattern;
use log::{debug, info, warn};

use super::filter::{CASE_INSENSITIVE, ResourceFilter};
use crate::context::RequestContext;
use crate::error::{ResourceError, ResourceResult};
use crate::feed::{FeedClient, FeedRegistry};
use crate::package::{
    PackageId, PackageIdentity, ResourceKind, ResourceMetadata, VersionConstraint,
    VersionSelector,
};
use crate::registry::RepositoryDescriptor;
use crate::resolver::DependencyResolver;

/// Page size for feed searches. Paging stops at the first short page.
pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Names or glob patterns. Empty means every package.
    pub names: Vec<String>,
    pub kinds: Vec<ResourceKind>,
    pub tags: Vec<String>,
    /// Raw version text, parsed by the coordinator.
    pub version: Option<String>,
    pub include_prerelease: bool,
    pub include_dependencies: bool,
}

impl SearchRequest {
    pub fn for_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Matches in repository priority order, unique by identity.
    pub results: Vec<ResourceMetadata>,
    /// Requested names no repository could satisfy.
    pub not_found: Vec<String>,
    /// `FeedUnavailable` per repository that failed during the search.
    pub unavailable: Vec<ResourceError>,
    /// `DependencyUnresolved` from dependency resolution.
    pub unresolved: Vec<ResourceError>,
}

impl SearchOutcome {
    pub fn not_found_errors(&self) -> impl Iterator<Item = ResourceError> + '_ {
        self.not_found
            .iter()
            .map(|name| ResourceError::PackageNotFound { name: name.clone() })
    }

    fn push_unique(&mut self, seen: &mut HashSet<PackageIdentity>, metadata: ResourceMetadata) {
        if seen.insert(metadata.identity.clone()) {
            self.results.push(metadata);
        }
    }
}

/// Searches repositories in priority order with fallthrough: a name found in
/// one repository is not looked up in any repository after it.
pub struct SearchCoordinator<'a> {
    feeds: &'a FeedRegistry,
}

impl<'a> SearchCoordinator<'a> {
    pub fn new(feeds: &'a FeedRegistry) -> Self {
        Self { feeds }
    }

    #[tracing::instrument(skip(self, ctx, repositories))]
    pub async fn search(
        &self,
        ctx: &RequestContext,
        request: &SearchRequest,
        repositories: &[RepositoryDescriptor],
    ) -> ResourceResult<SearchOutcome> {
        let constraint = VersionConstraint::parse_optional(request.version.as_deref())?;

        let mut wanted: Vec<String> = if request.names.is_empty() {
            vec!["*".to_string()]
        } else {
            request.names.clone()
        };
        let filter = ResourceFilter::new(
            request.kinds.clone(),
            request.tags.clone(),
            wanted.clone(),
        );

        let mut outcome = SearchOutcome::default();
        let mut seen = HashSet::new();

        for repository in repositories {
            if wanted.is_empty() {
                break;
            }
            ctx.check()?;

            let Some(feed) = self.feeds.get(&repository.name) else {
                warn!("No feed client for repository {}", repository.name);
                outcome.unavailable.push(ResourceError::FeedUnavailable {
                    repository: repository.name.clone(),
                    reason: "no client could be created for this repository".to_string(),
                });
                continue;
            };

            let mut satisfied = Vec::new();
            for name in &wanted {
                match self
                    .find_in_repository(ctx, feed.as_ref(), name, &constraint, request, &filter)
                    .await
                {
                    Ok(found) if found.is_empty() => {
                        debug!("{} not found in {}", name, repository.name)
                    }
                    Ok(found) => {
                        info!("Found {} match(es) for {} in {}", found.len(), name, repository.name);
                        satisfied.push(name.clone());
                        for metadata in found {
                            outcome.push_unique(&mut seen, metadata);
                        }
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warn!("{}", e);
                        outcome.unavailable.push(e);
                        break;
                    }
                }
            }
            wanted.retain(|name| !satisfied.contains(name));
        }

        if request.include_dependencies {
            self.append_dependencies(ctx, request, &mut outcome, &mut seen)
                .await?;
        }

        outcome.not_found = wanted;
        Ok(outcome)
    }

    /// Matches for one name in one repository after version selection and
    /// filtering. Feed failures become `FeedUnavailable`.
    async fn find_in_repository(
        &self,
        ctx: &RequestContext,
        feed: &dyn FeedClient,
        name: &str,
        constraint: &VersionConstraint,
        request: &SearchRequest,
        filter: &ResourceFilter,
    ) -> ResourceResult<Vec<ResourceMetadata>> {
        let repository = feed.repository().name.clone();
        let pre = request.include_prerelease;
        let fetch_pre = pre || constraint.names_prerelease();

        let candidates = if PackageId::is_pattern(name) || filter.wants_capability() {
            self.search_feed(ctx, feed, name, constraint, fetch_pre, filter)
                .await?
        } else {
            ctx.check()?;
            let all_versions = !matches!(constraint, VersionConstraint::Unconstrained);
            feed.metadata(&PackageId::new(name), fetch_pre, all_versions)
                .await
                .map_err(|e| ResourceError::feed_unavailable(&repository, &e))?
        };

        let mut selected = Vec::new();
        for group in group_by_id(candidates) {
            selected.extend(VersionSelector::select(&group, constraint, pre));
        }
        Ok(filter.apply(selected))
    }

    /// Paged feed search, then all versions of each match when the
    /// constraint needs more than the latest.
    async fn search_feed(
        &self,
        ctx: &RequestContext,
        feed: &dyn FeedClient,
        name: &str,
        constraint: &VersionConstraint,
        pre: bool,
        filter: &ResourceFilter,
    ) -> ResourceResult<Vec<ResourceMetadata>> {
        let repository = feed.repository().name.clone();
        let capability_search = filter.wants_capability();
        // An unparsable pattern is treated as a literal name
        let pattern = Pattern::new(name).ok();
        let text = if name == "*" { "" } else { name };

        let mut matches = Vec::new();
        let mut page = 0;
        loop {
            ctx.check()?;
            let results = feed
                .search(text, pre, page * PAGE_SIZE, PAGE_SIZE)
                .await
                .map_err(|e| ResourceError::feed_unavailable(&repository, &e))?;
            let last_page = results.len() < PAGE_SIZE;

            matches.extend(results.into_iter().filter(|m| {
                capability_search
                    || pattern.as_ref().map_or_else(
                        || m.id().matches(name),
                        |p| p.matches_with(m.id().as_str(), CASE_INSENSITIVE),
                    )
            }));

            if last_page {
                break;
            }
            page += 1;
        }

        if matches!(constraint, VersionConstraint::Unconstrained) {
            return Ok(matches);
        }

        let mut ids: Vec<PackageId> = Vec::new();
        for metadata in &matches {
            if !ids.contains(metadata.id()) {
                ids.push(metadata.id().clone());
            }
        }

        let mut versions = Vec::new();
        for id in ids {
            ctx.check()?;
            let all = feed
                .metadata(&id, pre, true)
                .await
                .map_err(|e| ResourceError::feed_unavailable(&repository, &e))?;
            versions.extend(all);
        }
        Ok(versions)
    }

    async fn append_dependencies(
        &self,
        ctx: &RequestContext,
        request: &SearchRequest,
        outcome: &mut SearchOutcome,
        seen: &mut HashSet<PackageIdentity>,
    ) -> ResourceResult<()> {
        let roots = outcome.results.clone();
        for root in &roots {
            let Some(feed) = self.feeds.get(&root.repository) else {
                continue;
            };
            let resolution = DependencyResolver::new(feed.as_ref(), request.include_prerelease)
                .resolve(ctx, root)
                .await?;
            for dependency in resolution.dependencies() {
                outcome.push_unique(seen, dependency.clone());
            }
            outcome.unresolved.extend(resolution.unresolved);
        }
        Ok(())
    }
}

/// Split results into per-id groups, keeping first-appearance order.
fn group_by_id(results: Vec<ResourceMetadata>) -> Vec<Vec<ResourceMetadata>> {
    let mut groups: Vec<Vec<ResourceMetadata>> = Vec::new();
    for metadata in results {
        match groups.iter_mut().find(|g| g[0].id() == metadata.id()) {
            Some(group) => group.push(metadata),
            None => groups.push(vec![metadata]),
        }
    }
    groups
}
