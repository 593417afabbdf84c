use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::identity::{PackageId, PackageIdentity};
use super::metadata::{ResourceKind, ResourceMetadata};
use super::version::{ResourceVersion, Versioned};
use crate::runtime::Runtime;

/// Manifest written next to each installed version (`meta.json`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Meta {
    pub name: PackageId,
    pub version: ResourceVersion,
    pub kind: ResourceKind,
    pub description: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub dsc_resources: Vec<String>,
    #[serde(default)]
    pub role_capabilities: Vec<String>,
    /// Dependency id to constraint text, over all dependency groups.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    pub installed_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub repository: String,
    pub repository_url: String,
    pub install_path: PathBuf,
}

impl Meta {
    pub fn from_metadata(
        metadata: &ResourceMetadata,
        repository_url: &str,
        install_path: PathBuf,
        installed_at: DateTime<Utc>,
    ) -> Self {
        let dependencies = metadata
            .dependencies()
            .map(|d| (d.id.to_string(), d.constraint.to_string()))
            .collect();

        Meta {
            name: metadata.id().clone(),
            version: metadata.identity.version.clone(),
            kind: metadata.primary_kind(),
            description: metadata.description.clone(),
            author: metadata.author.clone(),
            tags: metadata.tags().to_vec(),
            commands: metadata.capability_names(ResourceKind::Command),
            dsc_resources: metadata.capability_names(ResourceKind::DscResource),
            role_capabilities: metadata.capability_names(ResourceKind::RoleCapability),
            dependencies,
            installed_at,
            published_at: metadata.published,
            repository: metadata.repository.clone(),
            repository_url: repository_url.to_string(),
            install_path,
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.name.clone(), self.version.clone())
    }

    /// True if this package declares a dependency on `id`.
    pub fn depends_on(&self, id: &PackageId) -> bool {
        self.dependencies.keys().any(|dep| id.matches(dep))
    }

    #[tracing::instrument(skip(runtime, path))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        let meta: Meta = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {:?}", path))?;
        Ok(meta)
    }

    #[tracing::instrument(skip(self, runtime, path))]
    pub fn save<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        runtime
            .write(path, content.as_bytes())
            .with_context(|| format!("Failed to save manifest to {:?}", path))
    }
}

impl Versioned for Meta {
    fn version(&self) -> &ResourceVersion {
        &self.version
    }
}
