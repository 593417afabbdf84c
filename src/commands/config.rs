use anyhow::Result;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

use super::paths::{default_install_root, default_registry_path};
use crate::{
    error::ResourceResult,
    feed::{FeedFactory, FeedRegistry},
    registry::{RepositoryDescriptor, RepositoryRegistry, RepositoryStore, filter_repositories},
    runtime::Runtime,
};

/// Resolved locations and shared services for one CLI invocation.
pub struct Config<R: Runtime> {
    pub runtime: Arc<R>,
    pub install_root: PathBuf,
    pub registry_path: PathBuf,
}

impl<R: Runtime + 'static> Config<R> {
    pub fn new(
        runtime: R,
        install_root: Option<PathBuf>,
        registry_path: Option<PathBuf>,
    ) -> Result<Self> {
        let install_root = match install_root {
            Some(path) => path,
            None => default_install_root(&runtime)?,
        };
        let registry_path = match registry_path {
            Some(path) => path,
            None => default_registry_path(&runtime)?,
        };
        debug!(
            "Using install root {:?} and repository store {:?}",
            install_root, registry_path
        );

        Ok(Self {
            runtime: Arc::new(runtime),
            install_root,
            registry_path,
        })
    }

    pub fn store(&self) -> RepositoryStore<'_, R> {
        RepositoryStore::new(self.runtime.as_ref(), self.registry_path.clone())
    }

    /// Registered repositories in priority order, restricted to `requested`
    /// when it is non-empty.
    pub fn repositories(&self, requested: &[String]) -> ResourceResult<Vec<RepositoryDescriptor>> {
        filter_repositories(self.store().list_repositories()?, requested)
    }

    pub fn feeds(&self, repositories: &[RepositoryDescriptor]) -> FeedRegistry {
        let factory = FeedFactory::new(Arc::clone(&self.runtime));
        FeedRegistry::from_repositories(&factory, repositories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceError;
    use crate::runtime::{MockRuntime, RealRuntime};
    use tempfile::tempdir;

    #[test]
    fn test_config_uses_defaults() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| false);
        runtime
            .expect_home_dir()
            .returning(|| Some(PathBuf::from("/home/user")));
        runtime
            .expect_config_dir()
            .returning(|| Some(PathBuf::from("/home/user/.config")));

        let config = Config::new(runtime, None, None).unwrap();

        assert_eq!(config.install_root, PathBuf::from("/home/user/.resget"));
        assert_eq!(
            config.registry_path,
            PathBuf::from("/home/user/.config/resget/repositories.json")
        );
    }

    #[test]
    fn test_config_explicit_paths_skip_lookups() {
        let mut runtime = MockRuntime::new();
        runtime.expect_home_dir().never();
        runtime.expect_config_dir().never();

        let config = Config::new(
            runtime,
            Some(PathBuf::from("/data/resources")),
            Some(PathBuf::from("/data/repos.json")),
        )
        .unwrap();

        assert_eq!(config.install_root, PathBuf::from("/data/resources"));
        assert_eq!(config.registry_path, PathBuf::from("/data/repos.json"));
    }

    #[test]
    fn test_repositories_and_feeds() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let config = Config::new(
            RealRuntime,
            Some(dir.path().join("root")),
            Some(dir.path().join("repos.json")),
        )
        .unwrap();
        let store = config.store();
        store
            .register(RepositoryDescriptor::new("local", dir.path().join("feed").display().to_string()))
            .unwrap();
        store
            .register(
                RepositoryDescriptor::new("gallery", "https://gallery.test/api").with_priority(10),
            )
            .unwrap();

        // --- Execute ---
        let all = config.repositories(&[]).unwrap();
        let feeds = config.feeds(&all);
        let only_local = config.repositories(&["LOCAL".to_string()]).unwrap();

        // --- Verify ---
        let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["gallery", "local"]);
        assert_eq!(feeds.len(), 2);
        assert!(feeds.get("Gallery").is_some());
        assert_eq!(only_local.len(), 1);
        assert!(matches!(
            config.repositories(&["missing".to_string()]),
            Err(ResourceError::Configuration(_))
        ));
    }
}
