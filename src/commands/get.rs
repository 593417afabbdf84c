use anyhow::Result;

use super::config::Config;
use crate::{application::list_installed, package::Meta, runtime::Runtime};

/// List installed resources.
#[tracing::instrument(skip(config))]
pub fn get<R: Runtime + 'static>(
    config: &Config<R>,
    names: &[String],
    version: Option<&str>,
) -> Result<()> {
    let installed = list_installed(
        config.runtime.as_ref(),
        config.install_root.clone(),
        names,
        version,
    )?;

    if installed.is_empty() {
        println!("No resources installed.");
        return Ok(());
    }
    for meta in &installed {
        println!("{}", format_installed(meta));
    }
    Ok(())
}

fn format_installed(meta: &Meta) -> String {
    format!(
        "{:<32} {:<16} {:<12} {}",
        meta.name.as_str(),
        meta.version.to_string(),
        meta.repository,
        meta.install_path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    #[test]
    fn test_get_empty_root() {
        let dir = tempdir().unwrap();
        let config = Config::new(
            RealRuntime,
            Some(dir.path().join("root")),
            Some(dir.path().join("repos.json")),
        )
        .unwrap();

        assert!(get(&config, &[], None).is_ok());
    }

    #[test]
    fn test_get_rejects_bad_version() {
        let dir = tempdir().unwrap();
        let config = Config::new(
            RealRuntime,
            Some(dir.path().join("root")),
            Some(dir.path().join("repos.json")),
        )
        .unwrap();

        let err = get(&config, &[], Some("[3.0, 1.0]")).unwrap_err();

        assert!(err.to_string().contains("invalid version constraint"));
    }
}
