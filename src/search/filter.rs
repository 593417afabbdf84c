use glob::{MatchOptions, Pattern};

use crate::package::{PackageId, ResourceKind, ResourceMetadata};

pub(crate) const CASE_INSENSITIVE: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Tag and kind filters applied to search results.
///
/// Tags match when the result carries any requested tag. Kinds are OR-ed:
/// `Module`/`Script` test the kind marker, capability kinds require a
/// declared capability whose name is one of the requested names.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    kinds: Vec<ResourceKind>,
    tags: Vec<String>,
    names: Vec<String>,
}

impl ResourceFilter {
    pub fn new(kinds: Vec<ResourceKind>, tags: Vec<String>, names: Vec<String>) -> Self {
        Self { kinds, tags, names }
    }

    /// True when the kind filter asks for commands, DSC resources or role
    /// capabilities, which makes the search name a capability name.
    pub fn wants_capability(&self) -> bool {
        self.kinds.iter().any(|k| k.is_capability())
    }

    pub fn matches_tags(&self, metadata: &ResourceMetadata) -> bool {
        self.tags.is_empty() || self.tags.iter().any(|t| metadata.has_tag(t))
    }

    pub fn matches_kind(&self, metadata: &ResourceMetadata) -> bool {
        if self.kinds.is_empty() {
            return true;
        }
        self.kinds.iter().any(|&kind| {
            if kind.is_capability() {
                self.has_named_capability(metadata, kind)
            } else {
                metadata.has_kind(kind)
            }
        })
    }

    fn has_named_capability(&self, metadata: &ResourceMetadata, kind: ResourceKind) -> bool {
        let specific: Vec<&String> = self.names.iter().filter(|n| n.as_str() != "*").collect();
        if specific.is_empty() {
            return metadata.has_kind(kind);
        }
        specific.iter().any(|name| {
            if PackageId::is_pattern(name) {
                Pattern::new(name).is_ok_and(|p| {
                    metadata
                        .capability_names(kind)
                        .iter()
                        .any(|c| p.matches_with(c, CASE_INSENSITIVE))
                })
            } else {
                metadata.has_capability(kind, name)
            }
        })
    }

    pub fn matches(&self, metadata: &ResourceMetadata) -> bool {
        self.matches_tags(metadata) && self.matches_kind(metadata)
    }

    pub fn apply(&self, results: Vec<ResourceMetadata>) -> Vec<ResourceMetadata> {
        results.into_iter().filter(|m| self.matches(m)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageIdentity, ResourceVersion};

    fn resource(id: &str, tags: &[&str]) -> ResourceMetadata {
        ResourceMetadata::new(
            PackageIdentity::new(id, ResourceVersion::new(1, 0, 0)),
            "repo",
        )
        .with_tags(tags.iter().copied())
    }

    #[test]
    fn test_no_filters_match_everything() {
        let filter = ResourceFilter::default();
        assert!(filter.matches(&resource("A", &[])));
        assert!(!filter.wants_capability());
    }

    #[test]
    fn test_tags_intersect_case_insensitively() {
        let filter = ResourceFilter::new(vec![], vec!["azure".into(), "cloud".into()], vec![]);
        assert!(filter.matches(&resource("A", &["Azure"])));
        assert!(!filter.matches(&resource("B", &["Testing"])));
    }

    #[test]
    fn test_module_and_script_use_markers() {
        let filter = ResourceFilter::new(vec![ResourceKind::Script], vec![], vec![]);
        assert!(filter.matches(&resource("S", &["PSScript"])));
        assert!(filter.matches(&resource("Both", &["PSScript", "PSModule"])));
        assert!(!filter.matches(&resource("M", &["PSModule"])));

        let modules = ResourceFilter::new(vec![ResourceKind::Module], vec![], vec![]);
        assert!(modules.matches(&resource("M", &["PSModule"])));
        assert!(modules.matches(&resource("Both", &["PSScript", "PSModule"])));
        assert!(!modules.matches(&resource("S", &["PSScript"])));
        assert!(!modules.matches(&resource("Untagged", &[])));
    }

    #[test]
    fn test_command_kind_requires_named_capability() {
        let filter = ResourceFilter::new(
            vec![ResourceKind::Command],
            vec![],
            vec!["Get-Thing".into()],
        );
        assert!(filter.wants_capability());
        assert!(filter.matches(&resource("A", &["PSModule", "PSCommand_get-thing"])));
        // A command with a matching prefix is not enough.
        assert!(!filter.matches(&resource("B", &["PSCommand_Get-ThingElse"])));
        // The right name under another capability kind does not count either.
        assert!(!filter.matches(&resource("C", &["PSDscResource_Get-Thing"])));
    }

    #[test]
    fn test_capability_kind_without_names_needs_any_capability() {
        let filter = ResourceFilter::new(vec![ResourceKind::DscResource], vec![], vec!["*".into()]);
        assert!(filter.matches(&resource("A", &["PSDscResource_File"])));
        assert!(!filter.matches(&resource("B", &["PSModule"])));
    }

    #[test]
    fn test_kinds_are_or_ed() {
        let filter = ResourceFilter::new(
            vec![ResourceKind::Script, ResourceKind::RoleCapability],
            vec![],
            vec!["Admin*".into()],
        );
        assert!(filter.matches(&resource("S", &["PSScript"])));
        assert!(filter.matches(&resource("R", &["PSRoleCapability_AdminRole"])));
        let kept = filter.apply(vec![resource("M", &["PSModule"]), resource("S", &["PSScript"])]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id().as_str(), "S");
    }
}
