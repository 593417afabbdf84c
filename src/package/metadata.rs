//! Resource metadata as reported by a feed.
//!
//! Feed tags mix free-form keywords with two kinds of markers: kind markers
//! (`PSModule`, `PSScript`) and prefix-encoded capabilities such as
//! `PSCommand_Get-Thing`. Both are parsed once, when the metadata is built.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{PackageId, PackageIdentity};
use super::version::{ResourceVersion, VersionConstraint, Versioned};

const MODULE_MARKER: &str = "PSModule";
const SCRIPT_MARKER: &str = "PSScript";

/// The kinds of installable resources and declared sub-capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Module,
    Script,
    Command,
    DscResource,
    RoleCapability,
}

impl ResourceKind {
    /// Capability kinds are declared by a package rather than installed on their own.
    pub fn is_capability(self) -> bool {
        self.tag_prefix().is_some()
    }

    /// The tag prefix (without the `_` separator) encoding this capability.
    pub fn tag_prefix(self) -> Option<&'static str> {
        match self {
            ResourceKind::Command => Some("PSCommand"),
            ResourceKind::DscResource => Some("PSDscResource"),
            ResourceKind::RoleCapability => Some("PSRoleCapability"),
            ResourceKind::Module | ResourceKind::Script => None,
        }
    }

    fn marker(self) -> Option<&'static str> {
        match self {
            ResourceKind::Module => Some(MODULE_MARKER),
            ResourceKind::Script => Some(SCRIPT_MARKER),
            _ => None,
        }
    }

    const CAPABILITIES: [ResourceKind; 3] = [
        ResourceKind::Command,
        ResourceKind::DscResource,
        ResourceKind::RoleCapability,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Module => "module",
            ResourceKind::Script => "script",
            ResourceKind::Command => "command",
            ResourceKind::DscResource => "dscresource",
            ResourceKind::RoleCapability => "rolecapability",
        };
        f.write_str(s)
    }
}

impl FromStr for ResourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "module" => Ok(ResourceKind::Module),
            "script" => Ok(ResourceKind::Script),
            "command" => Ok(ResourceKind::Command),
            "dscresource" => Ok(ResourceKind::DscResource),
            "rolecapability" => Ok(ResourceKind::RoleCapability),
            _ => anyhow::bail!(
                "Unknown resource kind: {}. Expected module, script, command, dscresource, or rolecapability.",
                s
            ),
        }
    }
}

/// A capability declared through a prefixed tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability {
    pub kind: ResourceKind,
    pub name: String,
}

impl Capability {
    /// Parse a `<Prefix>_<Name>` tag. Plain keywords yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let (prefix, name) = tag.split_once('_')?;
        if name.is_empty() {
            return None;
        }
        ResourceKind::CAPABILITIES
            .into_iter()
            .find(|kind| {
                kind.tag_prefix()
                    .is_some_and(|p| p.eq_ignore_ascii_case(prefix))
            })
            .map(|kind| Capability {
                kind,
                name: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub id: PackageId,
    pub constraint: VersionConstraint,
}

impl Dependency {
    pub fn new(id: impl Into<PackageId>, constraint: VersionConstraint) -> Self {
        Self {
            id: id.into(),
            constraint,
        }
    }
}

/// Dependencies declared for one target environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyGroup {
    pub target: Option<String>,
    pub dependencies: Vec<Dependency>,
}

/// Everything a feed reports about one version of one package.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMetadata {
    pub identity: PackageIdentity,
    pub description: Option<String>,
    pub author: Option<String>,
    pub dependency_groups: Vec<DependencyGroup>,
    pub published: Option<DateTime<Utc>>,
    pub project_url: Option<String>,
    pub license_url: Option<String>,
    pub icon_url: Option<String>,
    /// Name of the repository this metadata came from.
    pub repository: String,
    tags: Vec<String>,
    capabilities: Vec<Capability>,
}

impl ResourceMetadata {
    pub fn new(identity: PackageIdentity, repository: impl Into<String>) -> Self {
        Self {
            identity,
            description: None,
            author: None,
            dependency_groups: Vec::new(),
            published: None,
            project_url: None,
            license_url: None,
            icon_url: None,
            repository: repository.into(),
            tags: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_tags(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_dependencies(mut self, group: DependencyGroup) -> Self {
        self.dependency_groups.push(group);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the tags and re-derive the capability list.
    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.capabilities = tags.iter().filter_map(|t| Capability::from_tag(t)).collect();
        self.tags = tags;
    }

    pub fn id(&self) -> &PackageId {
        &self.identity.id
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Names of the capabilities of one kind.
    pub fn capability_names(&self, kind: ResourceKind) -> Vec<String> {
        self.capabilities
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Kind marker membership for `Module`/`Script`, capability presence otherwise.
    pub fn has_kind(&self, kind: ResourceKind) -> bool {
        match kind.marker() {
            Some(marker) => self.has_tag(marker),
            None => self.capabilities.iter().any(|c| c.kind == kind),
        }
    }

    pub fn has_capability(&self, kind: ResourceKind, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.kind == kind && c.name.eq_ignore_ascii_case(name))
    }

    /// The installable kind: scripts carry only the script marker.
    pub fn primary_kind(&self) -> ResourceKind {
        if self.has_tag(SCRIPT_MARKER) && !self.has_tag(MODULE_MARKER) {
            ResourceKind::Script
        } else {
            ResourceKind::Module
        }
    }

    /// All dependencies across groups.
    pub fn dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependency_groups
            .iter()
            .flat_map(|g| g.dependencies.iter())
    }
}

impl Versioned for ResourceMetadata {
    fn version(&self) -> &ResourceVersion {
        &self.identity.version
    }
}
