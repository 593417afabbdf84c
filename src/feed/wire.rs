//! JSON shapes shared by remote feeds and `resource.json` files.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::package::{
    Dependency, DependencyGroup, PackageIdentity, ResourceMetadata, ResourceVersion,
    VersionConstraint,
};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedPackage {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub dependency_groups: Vec<FeedDependencyGroup>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub license_url: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

/// Tags arrive either as a list or as one space-separated string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Tags {
    List(Vec<String>),
    Text(String),
}

impl Default for Tags {
    fn default() -> Self {
        Tags::List(Vec::new())
    }
}

impl Tags {
    fn into_vec(self) -> Vec<String> {
        match self {
            Tags::List(tags) => tags,
            Tags::Text(text) => text.split_whitespace().map(str::to_string).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedDependencyGroup {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<FeedDependency>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedDependency {
    pub id: String,
    /// Dependency version text; a bare version is a minimum.
    #[serde(default)]
    pub version: String,
}

/// Response of the search endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub packages: Vec<FeedPackage>,
}

impl FeedPackage {
    /// Validate and convert into domain metadata tagged with its repository.
    pub fn into_metadata(self, repository: &str) -> Result<ResourceMetadata> {
        let version = ResourceVersion::parse(&self.version)
            .with_context(|| format!("Invalid version for package '{}'", self.id))?;

        let mut groups = Vec::with_capacity(self.dependency_groups.len());
        for group in self.dependency_groups {
            let mut dependencies = Vec::with_capacity(group.dependencies.len());
            for dep in group.dependencies {
                let constraint = VersionConstraint::parse_dependency(&dep.version).with_context(
                    || format!("Invalid dependency '{}' of package '{}'", dep.id, self.id),
                )?;
                dependencies.push(Dependency::new(dep.id, constraint));
            }
            groups.push(DependencyGroup {
                target: group.target,
                dependencies,
            });
        }

        let mut metadata = ResourceMetadata::new(PackageIdentity::new(self.id, version), repository)
            .with_tags(self.tags.into_vec());
        metadata.description = self.description;
        metadata.author = self.author;
        metadata.dependency_groups = groups;
        metadata.published = self.published;
        metadata.project_url = self.project_url;
        metadata.license_url = self.license_url;
        metadata.icon_url = self.icon_url;
        Ok(metadata)
    }
}
