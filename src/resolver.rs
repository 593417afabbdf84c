//! Transitive dependency resolution.
//!
//! Resolution walks the dependency graph depth-first with an explicit stack.
//! The ids on the active path form the in-progress set, so a cycle reuses the
//! selection already made instead of re-entering it. An id reached again
//! through another path has its constraints intersected; the most
//! restrictive constraint wins. When the selection no longer fits it is
//! replaced: whatever only the old version pulled in leaves the closure, and
//! the replacement's own dependencies are walked. There is no backtracking
//! across siblings.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::context::RequestContext;
use crate::error::{ResourceError, ResourceResult};
use crate::feed::FeedClient;
use crate::package::{
    Dependency, PackageId, ResourceMetadata, VersionConstraint, VersionSelector, Versioned,
};

/// The dependency closure of one package.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Root first, then dependencies in discovery order, one entry per id.
    pub packages: Vec<ResourceMetadata>,
    /// Effective constraint per dependency id.
    pub constraints: HashMap<PackageId, VersionConstraint>,
    /// `DependencyUnresolved` errors for dependencies left out of the closure.
    pub unresolved: Vec<ResourceError>,
}

impl Resolution {
    pub fn root(&self) -> Option<&ResourceMetadata> {
        self.packages.first()
    }

    pub fn dependencies(&self) -> &[ResourceMetadata] {
        self.packages.get(1..).unwrap_or_default()
    }

    pub fn constraint_for(&self, id: &PackageId) -> VersionConstraint {
        self.constraints.get(id).cloned().unwrap_or_default()
    }

    fn position(&self, id: &PackageId) -> Option<usize> {
        self.packages.iter().position(|p| p.id() == id)
    }
}

struct Frame {
    id: PackageId,
    pending: std::vec::IntoIter<Dependency>,
}

impl Frame {
    fn new(metadata: &ResourceMetadata) -> Self {
        let dependencies: Vec<Dependency> = metadata.dependencies().cloned().collect();
        Self {
            id: metadata.id().clone(),
            pending: dependencies.into_iter(),
        }
    }
}

/// One accepted edge into a selected package.
struct Requirement {
    parent: PackageId,
    constraint: VersionConstraint,
}

/// Incoming edges per selected dependency. The root has none.
type Requirements = HashMap<PackageId, Vec<Requirement>>;

enum Reconciled {
    Kept,
    Replaced(ResourceMetadata),
    Conflict(ResourceError),
}

pub struct DependencyResolver<'a> {
    feed: &'a dyn FeedClient,
    include_prerelease: bool,
}

impl<'a> DependencyResolver<'a> {
    /// Resolver over the feed of the root package's repository.
    pub fn new(feed: &'a dyn FeedClient, include_prerelease: bool) -> Self {
        Self {
            feed,
            include_prerelease,
        }
    }

    #[tracing::instrument(skip(self, ctx, root), fields(root = %root.identity))]
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        root: &ResourceMetadata,
    ) -> ResourceResult<Resolution> {
        let mut resolution = Resolution {
            packages: vec![root.clone()],
            ..Default::default()
        };
        let mut requirements = Requirements::new();
        let mut in_progress: HashSet<PackageId> = HashSet::from([root.id().clone()]);
        let mut candidates: HashMap<PackageId, Vec<ResourceMetadata>> = HashMap::new();
        let mut stack = vec![Frame::new(root)];

        loop {
            let next = match stack.last_mut() {
                None => break,
                Some(frame) => frame.pending.next().map(|dep| (frame.id.clone(), dep)),
            };
            let Some((parent, dep)) = next else {
                if let Some(done) = stack.pop() {
                    in_progress.remove(&done.id);
                }
                continue;
            };

            ctx.check()?;

            if in_progress.contains(&dep.id) {
                self.close_cycle(&mut resolution, &mut requirements, root.id(), &parent, &dep);
                continue;
            }

            if let Some(position) = resolution.position(&dep.id) {
                let available = candidates.get(&dep.id).map(Vec::as_slice).unwrap_or_default();
                match self.reconcile(&resolution, position, &parent, &dep, available) {
                    Reconciled::Kept => {
                        require(&mut resolution, &mut requirements, &parent, &dep);
                    }
                    Reconciled::Replaced(replacement) => {
                        require(&mut resolution, &mut requirements, &parent, &dep);
                        detach(&mut resolution, &mut requirements, &dep.id);
                        if let Some(position) = resolution.position(&dep.id) {
                            resolution.packages[position] = replacement.clone();
                        }
                        in_progress.insert(dep.id.clone());
                        stack.push(Frame::new(&replacement));
                    }
                    Reconciled::Conflict(error) => resolution.unresolved.push(error),
                }
                continue;
            }

            if !candidates.contains_key(&dep.id) {
                let include_prerelease = self.include_prerelease || dep.constraint.names_prerelease();
                match self.feed.metadata(&dep.id, include_prerelease, true).await {
                    Ok(found) => {
                        candidates.insert(dep.id.clone(), found);
                    }
                    Err(e) => {
                        warn!("Failed to fetch dependency {}: {:#}", dep.id, e);
                        resolution
                            .unresolved
                            .push(unresolved(&parent, &dep, &dep.constraint, format!("{:#}", e)));
                        continue;
                    }
                }
            }
            let available = candidates.get(&dep.id).map(Vec::as_slice).unwrap_or_default();

            let Some(selected) =
                VersionSelector::best(available, &dep.constraint, self.include_prerelease)
            else {
                let reason = if available.is_empty() {
                    format!("not found in repository '{}'", self.feed.repository().name)
                } else {
                    "no available version satisfies the constraint".to_string()
                };
                resolution
                    .unresolved
                    .push(unresolved(&parent, &dep, &dep.constraint, reason));
                continue;
            };

            debug!("{} -> {}", parent, selected.identity);
            require(&mut resolution, &mut requirements, &parent, &dep);
            in_progress.insert(dep.id.clone());
            stack.push(Frame::new(&selected));
            resolution.packages.push(selected);
        }

        Ok(resolution)
    }

    /// A dependency back onto the active path keeps the selection made there,
    /// provided that selection satisfies it.
    fn close_cycle(
        &self,
        resolution: &mut Resolution,
        requirements: &mut Requirements,
        root: &PackageId,
        parent: &PackageId,
        dep: &Dependency,
    ) {
        let Some(position) = resolution.position(&dep.id) else {
            return;
        };
        let selected = resolution.packages[position].version().clone();
        if !dep.constraint.satisfies(&selected) {
            resolution.unresolved.push(unresolved(
                parent,
                dep,
                &dep.constraint,
                format!("cycle back to {} {}, which does not satisfy it", dep.id, selected),
            ));
            return;
        }

        debug!("Cycle {} -> {}, reusing {}", parent, dep.id, selected);
        if &dep.id != root {
            require(resolution, requirements, parent, dep);
        }
    }

    /// Merge a second requirement on an already selected package.
    fn reconcile(
        &self,
        resolution: &Resolution,
        position: usize,
        parent: &PackageId,
        dep: &Dependency,
        available: &[ResourceMetadata],
    ) -> Reconciled {
        let existing = resolution.constraint_for(&dep.id);
        let Some(merged) = existing.intersect(&dep.constraint) else {
            return Reconciled::Conflict(unresolved(
                parent,
                dep,
                &dep.constraint,
                format!("conflicts with the existing requirement {}", existing.describe()),
            ));
        };

        let current = &resolution.packages[position];
        if merged.satisfies(current.version()) {
            return Reconciled::Kept;
        }

        match VersionSelector::best(available, &merged, self.include_prerelease) {
            Some(replacement) => {
                debug!(
                    "Replacing {} with {} to satisfy {}",
                    current.identity,
                    replacement.identity,
                    merged.describe()
                );
                Reconciled::Replaced(replacement)
            }
            None => Reconciled::Conflict(unresolved(
                parent,
                dep,
                &merged,
                "no available version satisfies every requirement".to_string(),
            )),
        }
    }
}

/// Record the edge `parent -> dep` and tighten the effective constraint.
fn require(
    resolution: &mut Resolution,
    requirements: &mut Requirements,
    parent: &PackageId,
    dep: &Dependency,
) {
    let edges = requirements.entry(dep.id.clone()).or_default();
    edges.retain(|r| &r.parent != parent);
    edges.push(Requirement {
        parent: parent.clone(),
        constraint: dep.constraint.clone(),
    });
    if let Some(effective) = effective(edges) {
        resolution.constraints.insert(dep.id.clone(), effective);
    }
}

/// Intersection of every edge's constraint.
fn effective(edges: &[Requirement]) -> Option<VersionConstraint> {
    let (first, rest) = edges.split_first()?;
    rest.iter()
        .try_fold(first.constraint.clone(), |acc, r| acc.intersect(&r.constraint))
}

/// Forget the edges `replaced` contributed before it is swapped for another
/// version. Packages left without a requirer leave the closure, transitively,
/// together with the unresolved entries they reported. Everything else gets
/// its effective constraint recomputed from the edges that remain.
fn detach(resolution: &mut Resolution, requirements: &mut Requirements, replaced: &PackageId) {
    let mut gone: Vec<PackageId> = vec![replaced.clone()];
    let mut pending = vec![replaced.clone()];

    while let Some(requirer) = pending.pop() {
        let mut touched = Vec::new();
        for (target, edges) in requirements.iter_mut() {
            let before = edges.len();
            edges.retain(|r| r.parent != requirer);
            if edges.len() != before {
                touched.push(target.clone());
            }
        }

        for target in touched {
            let remaining = requirements.get(&target).map(Vec::as_slice).unwrap_or_default();
            if remaining.is_empty() {
                debug!("{} is no longer required", target);
                requirements.remove(&target);
                resolution.constraints.remove(&target);
                resolution.packages.retain(|p| p.id() != &target);
                pending.push(target.clone());
                gone.push(target);
                continue;
            }
            if let Some(effective) = effective(remaining) {
                resolution.constraints.insert(target, effective);
            }
        }
    }

    resolution.unresolved.retain(|error| match error {
        ResourceError::DependencyUnresolved { parent, .. } => {
            let parent = PackageId::from(parent.as_str());
            !gone.contains(&parent)
        }
        _ => true,
    });
}

fn unresolved(
    parent: &PackageId,
    dep: &Dependency,
    constraint: &VersionConstraint,
    reason: String,
) -> ResourceError {
    ResourceError::DependencyUnresolved {
        parent: parent.to_string(),
        dependency: dep.id.to_string(),
        constraint: constraint.describe(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MockFeedClient;
    use crate::package::{DependencyGroup, PackageIdentity, ResourceVersion};
    use crate::registry::RepositoryDescriptor;
    use mockall::predicate::eq;

    fn v(s: &str) -> ResourceVersion {
        ResourceVersion::parse(s).unwrap()
    }

    fn package(id: &str, version: &str, deps: &[(&str, &str)]) -> ResourceMetadata {
        let dependencies = deps
            .iter()
            .map(|(id, c)| Dependency::new(*id, VersionConstraint::parse_dependency(c).unwrap()))
            .collect();
        ResourceMetadata::new(PackageIdentity::new(id, v(version)), "gallery").with_dependencies(
            DependencyGroup {
                target: None,
                dependencies,
            },
        )
    }

    fn feed() -> MockFeedClient {
        let mut feed = MockFeedClient::new();
        feed.expect_repository()
            .return_const(RepositoryDescriptor::new("gallery", "https://gallery"));
        feed
    }

    fn serve(feed: &mut MockFeedClient, id: &str, versions: Vec<ResourceMetadata>) {
        feed.expect_metadata()
            .with(eq(PackageId::from(id)), eq(false), eq(true))
            .times(1)
            .returning(move |_, _, _| Ok(versions.clone()));
    }

    fn identities(resolution: &Resolution) -> Vec<String> {
        resolution
            .packages
            .iter()
            .map(|p| p.identity.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_resolves_transitive_closure_in_discovery_order() {
        // --- Setup ---
        let mut feed = feed();
        serve(&mut feed, "B", vec![package("B", "1.0.0", &[("C", "")])]);
        serve(&mut feed, "C", vec![package("C", "2.0.0", &[]), package("C", "1.0.0", &[])]);
        serve(&mut feed, "D", vec![package("D", "1.0.0", &[])]);
        let root = package("A", "1.0.0", &[("B", "1.0"), ("D", "")]);

        // --- Execute ---
        let resolution = DependencyResolver::new(&feed, false)
            .resolve(&RequestContext::new(), &root)
            .await
            .unwrap();

        // --- Verify ---
        assert_eq!(identities(&resolution), vec!["A 1.0.0", "B 1.0.0", "C 2.0.0", "D 1.0.0"]);
        assert!(resolution.unresolved.is_empty());
        assert_eq!(resolution.dependencies().len(), 3);
        assert_eq!(resolution.root().unwrap().identity.to_string(), "A 1.0.0");
    }

    #[tokio::test]
    async fn test_cycle_terminates_with_each_package_once() {
        let mut feed = feed();
        serve(&mut feed, "B", vec![package("B", "1.0.0", &[("A", "1.0.0")])]);
        let root = package("A", "1.0.0", &[("B", "1.0.0")]);

        let resolution = DependencyResolver::new(&feed, false)
            .resolve(&RequestContext::new(), &root)
            .await
            .unwrap();

        assert_eq!(identities(&resolution), vec!["A 1.0.0", "B 1.0.0"]);
        assert!(resolution.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_missing_dependency_does_not_stop_siblings() {
        let mut feed = feed();
        serve(&mut feed, "Gone", vec![]);
        serve(&mut feed, "B", vec![package("B", "1.0.0", &[])]);
        let root = package("A", "1.0.0", &[("Gone", ""), ("B", "")]);

        let resolution = DependencyResolver::new(&feed, false)
            .resolve(&RequestContext::new(), &root)
            .await
            .unwrap();

        assert_eq!(identities(&resolution), vec!["A 1.0.0", "B 1.0.0"]);
        assert_eq!(resolution.unresolved.len(), 1);
        let message = resolution.unresolved[0].to_string();
        assert!(message.contains("Gone"), "{}", message);
        assert!(message.contains("gallery"), "{}", message);
    }

    #[tokio::test]
    async fn test_feed_error_is_recorded_as_unresolved() {
        let mut feed = feed();
        feed.expect_metadata()
            .returning(|_, _, _| Err(anyhow::anyhow!("connection reset")));
        let root = package("A", "1.0.0", &[("B", "")]);

        let resolution = DependencyResolver::new(&feed, false)
            .resolve(&RequestContext::new(), &root)
            .await
            .unwrap();

        assert_eq!(resolution.packages.len(), 1);
        assert!(matches!(
            &resolution.unresolved[0],
            ResourceError::DependencyUnresolved { reason, .. } if reason.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn test_most_restrictive_constraint_wins() {
        // A needs B >= 1.0 and C; C needs B in [1.0, 2.0). B 2.5 is picked
        // first, then replaced by 1.5.
        let mut feed = feed();
        serve(
            &mut feed,
            "B",
            vec![
                package("B", "2.5.0", &[]),
                package("B", "1.5.0", &[]),
                package("B", "0.9.0", &[]),
            ],
        );
        serve(&mut feed, "C", vec![package("C", "1.0.0", &[("B", "[1.0,2.0)")])]);
        let root = package("A", "1.0.0", &[("B", "1.0"), ("C", "")]);

        let resolution = DependencyResolver::new(&feed, false)
            .resolve(&RequestContext::new(), &root)
            .await
            .unwrap();

        assert_eq!(identities(&resolution), vec!["A 1.0.0", "B 1.5.0", "C 1.0.0"]);
        assert_eq!(
            resolution.constraint_for(&"b".into()).to_string(),
            "[1.0.0, 2.0.0)"
        );
        assert!(resolution.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_replacement_walks_its_own_dependencies() {
        // B 2.5 pulls in Old, B 1.5 pulls in D. Once C narrows B to [1.0, 2.0)
        // the closure must follow B 1.5.
        let mut feed = feed();
        serve(
            &mut feed,
            "B",
            vec![
                package("B", "2.5.0", &[("Old", "")]),
                package("B", "1.5.0", &[("D", "")]),
            ],
        );
        serve(&mut feed, "Old", vec![package("Old", "1.0.0", &[])]);
        serve(&mut feed, "C", vec![package("C", "1.0.0", &[("B", "[1.0,2.0)")])]);
        serve(&mut feed, "D", vec![package("D", "1.0.0", &[])]);
        let root = package("A", "1.0.0", &[("B", "1.0"), ("C", "")]);

        let resolution = DependencyResolver::new(&feed, false)
            .resolve(&RequestContext::new(), &root)
            .await
            .unwrap();

        assert_eq!(
            identities(&resolution),
            vec!["A 1.0.0", "B 1.5.0", "C 1.0.0", "D 1.0.0"]
        );
        assert!(!resolution.constraints.contains_key(&PackageId::from("Old")));
        assert!(resolution.constraints.contains_key(&PackageId::from("D")));
        assert!(resolution.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_replacement_forgets_problems_of_the_old_version() {
        let mut feed = feed();
        serve(
            &mut feed,
            "B",
            vec![
                package("B", "2.5.0", &[("Gone", "")]),
                package("B", "1.5.0", &[]),
            ],
        );
        serve(&mut feed, "Gone", vec![]);
        serve(&mut feed, "C", vec![package("C", "1.0.0", &[("B", "[1.0,2.0)")])]);
        let root = package("A", "1.0.0", &[("B", "1.0"), ("C", "")]);

        let resolution = DependencyResolver::new(&feed, false)
            .resolve(&RequestContext::new(), &root)
            .await
            .unwrap();

        assert_eq!(identities(&resolution), vec!["A 1.0.0", "B 1.5.0", "C 1.0.0"]);
        assert!(resolution.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_shared_dependency_survives_replacement() {
        // E is needed by both B 2.5 and C, so it stays after B is replaced.
        let mut feed = feed();
        serve(
            &mut feed,
            "B",
            vec![
                package("B", "2.5.0", &[("E", "")]),
                package("B", "1.5.0", &[]),
            ],
        );
        serve(&mut feed, "E", vec![package("E", "3.0.0", &[])]);
        serve(
            &mut feed,
            "C",
            vec![package("C", "1.0.0", &[("E", "2.0"), ("B", "[1.0,2.0)")])],
        );
        let root = package("A", "1.0.0", &[("B", "1.0"), ("C", "")]);

        let resolution = DependencyResolver::new(&feed, false)
            .resolve(&RequestContext::new(), &root)
            .await
            .unwrap();

        assert_eq!(
            identities(&resolution),
            vec!["A 1.0.0", "B 1.5.0", "E 3.0.0", "C 1.0.0"]
        );
        assert_eq!(
            resolution.constraint_for(&"E".into()),
            VersionConstraint::parse_dependency("2.0").unwrap()
        );
    }

    #[tokio::test]
    async fn test_cycle_back_edge_must_fit_the_selection() {
        let mut feed = feed();
        serve(&mut feed, "B", vec![package("B", "1.0.0", &[("A", "[2.0]")])]);
        let root = package("A", "1.0.0", &[("B", "")]);

        let resolution = DependencyResolver::new(&feed, false)
            .resolve(&RequestContext::new(), &root)
            .await
            .unwrap();

        assert_eq!(identities(&resolution), vec!["A 1.0.0", "B 1.0.0"]);
        assert_eq!(resolution.unresolved.len(), 1);
        let message = resolution.unresolved[0].to_string();
        assert!(message.contains("cycle back to A 1.0.0"), "{}", message);
    }

    #[tokio::test]
    async fn test_disjoint_constraints_are_unresolved() {
        let mut feed = feed();
        serve(&mut feed, "B", vec![package("B", "1.0.0", &[]), package("B", "3.0.0", &[])]);
        serve(&mut feed, "C", vec![package("C", "1.0.0", &[("B", "[1.0.0]")])]);
        let root = package("A", "1.0.0", &[("B", "[3.0.0]"), ("C", "")]);

        let resolution = DependencyResolver::new(&feed, false)
            .resolve(&RequestContext::new(), &root)
            .await
            .unwrap();

        assert_eq!(identities(&resolution), vec!["A 1.0.0", "B 3.0.0", "C 1.0.0"]);
        assert_eq!(resolution.unresolved.len(), 1);
        assert!(resolution.unresolved[0].to_string().contains("'C'"));
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_resolution() {
        let feed = feed();
        let root = package("A", "1.0.0", &[("B", "")]);
        let ctx = RequestContext::new();
        ctx.cancel();

        let result = DependencyResolver::new(&feed, false).resolve(&ctx, &root).await;

        assert!(matches!(result, Err(ResourceError::Cancelled)));
    }
}
