use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::runtime::Runtime;

const APP_DIR: &str = "resget";
const REGISTRY_FILE: &str = "repositories.json";

/// Get the default installation root directory
#[tracing::instrument(skip(runtime))]
pub fn default_install_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_install_root(runtime))
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".resget"))
    }
}

/// `<config_dir>/resget/repositories.json`
#[tracing::instrument(skip(runtime))]
pub fn default_registry_path<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let config_dir = runtime
        .config_dir()
        .context("Could not find configuration directory")?;
    Ok(config_dir.join(APP_DIR).join(REGISTRY_FILE))
}

#[cfg(target_os = "macos")]
fn system_install_root<R: Runtime>(_runtime: &R) -> PathBuf {
    PathBuf::from("/opt/resget")
}

#[cfg(target_os = "windows")]
fn system_install_root<R: Runtime>(_runtime: &R) -> PathBuf {
    PathBuf::from(r"C:\ProgramData\resget")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn system_install_root<R: Runtime>(_runtime: &R) -> PathBuf {
    PathBuf::from("/usr/local/share/resget")
}
