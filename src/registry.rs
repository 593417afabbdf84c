//! Registered repositories.
//!
//! Repositories live in a JSON file (`<config_dir>/resget/repositories.json`
//! by default). File order is registration order. Listing orders by priority,
//! where the lower number wins, and then by registration order.

use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, ResourceResult};
use crate::runtime::Runtime;

pub const DEFAULT_PRIORITY: u8 = 50;
pub const MAX_PRIORITY: u8 = 50;

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

/// A named source of packages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    pub name: String,
    pub url: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub trusted: bool,
    /// Environment variable holding a bearer token for this repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl RepositoryDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            priority: DEFAULT_PRIORITY,
            trusted: false,
            credential: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn trusted(mut self, trusted: bool) -> Self {
        self.trusted = trusted;
        self
    }

    fn validate(&self) -> ResourceResult<()> {
        if self.name.trim().is_empty() {
            return Err(ResourceError::configuration("repository name cannot be empty"));
        }
        if self.url.trim().is_empty() {
            return Err(ResourceError::configuration(format!(
                "repository '{}' has no URL",
                self.name
            )));
        }
        if self.priority > MAX_PRIORITY {
            return Err(ResourceError::configuration(format!(
                "repository '{}' priority {} is outside 0..={}",
                self.name, self.priority, MAX_PRIORITY
            )));
        }
        Ok(())
    }
}

/// Read access to the registered repositories.
#[cfg_attr(test, mockall::automock)]
pub trait RepositoryRegistry: Send + Sync {
    /// Repositories ordered by priority, then registration order.
    fn list_repositories(&self) -> ResourceResult<Vec<RepositoryDescriptor>>;
}

/// Changes applied by [`RepositoryStore::set`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct RepositoryUpdate {
    pub url: Option<String>,
    pub priority: Option<u8>,
    pub trusted: Option<bool>,
    pub credential: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct RegistryFile {
    #[serde(default)]
    repositories: Vec<RepositoryDescriptor>,
}

/// JSON-file backed repository registry.
pub struct RepositoryStore<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
}

impl<'a, R: Runtime> RepositoryStore<'a, R> {
    pub fn new(runtime: &'a R, path: PathBuf) -> Self {
        Self { runtime, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Repositories in registration order.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> ResourceResult<Vec<RepositoryDescriptor>> {
        if !self.runtime.exists(&self.path) {
            debug!("No repository store at {:?}", self.path);
            return Ok(Vec::new());
        }

        let content = self.runtime.read_to_string(&self.path).map_err(|e| {
            ResourceError::configuration(format!("cannot read {:?}: {:#}", self.path, e))
        })?;
        let file: RegistryFile = serde_json::from_str(&content).map_err(|e| {
            ResourceError::configuration(format!("cannot parse {:?}: {}", self.path, e))
        })?;

        for (i, repo) in file.repositories.iter().enumerate() {
            repo.validate()?;
            if file.repositories[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&repo.name))
            {
                return Err(ResourceError::configuration(format!(
                    "repository '{}' is registered more than once in {:?}",
                    repo.name, self.path
                )));
            }
        }

        Ok(file.repositories)
    }

    fn save(&self, repositories: Vec<RepositoryDescriptor>) -> ResourceResult<()> {
        let file = RegistryFile { repositories };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| ResourceError::configuration(e.to_string()))?;

        if let Some(parent) = self.path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime
                .create_dir_all(parent)
                .map_err(|e| ResourceError::file_system(parent, &e))?;
        }
        self.runtime
            .write(&self.path, content.as_bytes())
            .map_err(|e| ResourceError::file_system(&self.path, &e))
    }

    pub fn find(&self, name: &str) -> ResourceResult<Option<RepositoryDescriptor>> {
        Ok(self
            .load()?
            .into_iter()
            .find(|r| r.name.eq_ignore_ascii_case(name)))
    }

    pub fn register(&self, descriptor: RepositoryDescriptor) -> ResourceResult<()> {
        descriptor.validate()?;
        let mut repositories = self.load()?;

        if let Some(existing) = repositories
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(&descriptor.name))
        {
            return Err(ResourceError::configuration(format!(
                "repository '{}' is already registered",
                existing.name
            )));
        }
        if let Some(existing) = repositories
            .iter()
            .find(|r| r.url.eq_ignore_ascii_case(&descriptor.url))
        {
            return Err(ResourceError::configuration(format!(
                "URL {} is already registered as '{}'",
                descriptor.url, existing.name
            )));
        }

        info!("Registering repository '{}' at {}", descriptor.name, descriptor.url);
        repositories.push(descriptor);
        self.save(repositories)
    }

    pub fn set(&self, name: &str, update: RepositoryUpdate) -> ResourceResult<RepositoryDescriptor> {
        let mut repositories = self.load()?;
        let repo = repositories
            .iter_mut()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                ResourceError::configuration(format!("repository '{}' is not registered", name))
            })?;

        if let Some(url) = update.url {
            repo.url = url;
        }
        if let Some(priority) = update.priority {
            repo.priority = priority;
        }
        if let Some(trusted) = update.trusted {
            repo.trusted = trusted;
        }
        if let Some(credential) = update.credential {
            repo.credential = Some(credential);
        }
        repo.validate()?;

        let updated = repo.clone();
        self.save(repositories)?;
        Ok(updated)
    }

    pub fn unregister(&self, name: &str) -> ResourceResult<RepositoryDescriptor> {
        let mut repositories = self.load()?;
        let index = repositories
            .iter()
            .position(|r| r.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                ResourceError::configuration(format!("repository '{}' is not registered", name))
            })?;
        let removed = repositories.remove(index);
        info!("Unregistered repository '{}'", removed.name);
        self.save(repositories)?;
        Ok(removed)
    }
}

impl<R: Runtime> RepositoryRegistry for RepositoryStore<'_, R> {
    fn list_repositories(&self) -> ResourceResult<Vec<RepositoryDescriptor>> {
        let mut repositories = self.load()?;
        // Stable sort keeps registration order among equal priorities
        repositories.sort_by_key(|r| r.priority);
        Ok(repositories)
    }
}

/// Restrict a priority-ordered list to the named repositories, keeping order.
pub fn filter_repositories(
    repositories: Vec<RepositoryDescriptor>,
    requested: &[String],
) -> ResourceResult<Vec<RepositoryDescriptor>> {
    if requested.is_empty() {
        return Ok(repositories);
    }

    for name in requested {
        if !repositories.iter().any(|r| r.name.eq_ignore_ascii_case(name)) {
            return Err(ResourceError::configuration(format!(
                "repository '{}' is not registered",
                name
            )));
        }
    }

    Ok(repositories
        .into_iter()
        .filter(|r| requested.iter().any(|n| r.name.eq_ignore_ascii_case(n)))
        .collect())
}
