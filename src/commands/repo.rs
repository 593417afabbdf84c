use anyhow::Result;

use super::config::Config;
use crate::{
    registry::{RepositoryDescriptor, RepositoryRegistry, RepositoryUpdate},
    runtime::Runtime,
};

pub fn repo_list<R: Runtime + 'static>(config: &Config<R>) -> Result<()> {
    let repositories = config.store().list_repositories()?;
    if repositories.is_empty() {
        println!("No repositories registered.");
        return Ok(());
    }
    for repo in &repositories {
        println!("{}", format_repository(repo));
    }
    Ok(())
}

#[tracing::instrument(skip(config))]
pub fn repo_register<R: Runtime + 'static>(
    config: &Config<R>,
    descriptor: RepositoryDescriptor,
) -> Result<()> {
    let name = descriptor.name.clone();
    config.store().register(descriptor)?;
    println!("Registered repository '{}'.", name);
    Ok(())
}

#[tracing::instrument(skip(config))]
pub fn repo_set<R: Runtime + 'static>(
    config: &Config<R>,
    name: &str,
    update: RepositoryUpdate,
) -> Result<()> {
    let updated = config.store().set(name, update)?;
    println!("{}", format_repository(&updated));
    Ok(())
}

#[tracing::instrument(skip(config))]
pub fn repo_unregister<R: Runtime + 'static>(config: &Config<R>, name: &str) -> Result<()> {
    let removed = config.store().unregister(name)?;
    println!("Unregistered repository '{}'.", removed.name);
    Ok(())
}

fn format_repository(repo: &RepositoryDescriptor) -> String {
    let trust = if repo.trusted { "trusted" } else { "untrusted" };
    format!("{:<20} {:>3}  {:<9} {}", repo.name, repo.priority, trust, repo.url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> Config<RealRuntime> {
        Config::new(
            RealRuntime,
            Some(dir.join("root")),
            Some(dir.join("repos.json")),
        )
        .unwrap()
    }

    #[test]
    fn test_repo_lifecycle() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        repo_register(&config, RepositoryDescriptor::new("gallery", "https://gallery.test"))
            .unwrap();
        repo_set(
            &config,
            "GALLERY",
            RepositoryUpdate {
                trusted: Some(true),
                priority: Some(5),
                ..Default::default()
            },
        )
        .unwrap();

        let stored = config.store().find("gallery").unwrap().unwrap();
        assert!(stored.trusted);
        assert_eq!(stored.priority, 5);
        assert!(repo_list(&config).is_ok());

        repo_unregister(&config, "gallery").unwrap();
        assert!(config.store().find("gallery").unwrap().is_none());
    }

    #[test]
    fn test_repo_errors_surface() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        assert!(repo_unregister(&config, "missing").is_err());
        assert!(
            repo_register(
                &config,
                RepositoryDescriptor::new("bad", "https://x.test").with_priority(99)
            )
            .is_err()
        );
    }

    #[test]
    fn test_format_repository() {
        let repo = RepositoryDescriptor::new("gallery", "https://gallery.test").trusted(true);

        let line = format_repository(&repo);

        assert!(line.starts_with("gallery"));
        assert!(line.contains("50"));
        assert!(line.contains("trusted"));
        assert!(line.ends_with("https://gallery.test"));
    }
}
