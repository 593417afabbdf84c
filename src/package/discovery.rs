use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

use super::repository::MANIFEST_FILE;

/// Find all installed versions by scanning for manifest files.
///
/// Directory structure: `<root>/<id>/<version>/meta.json`. Entries whose
/// names start with `.` (staging, locks) are skipped.
#[tracing::instrument(skip(runtime, root))]
pub fn find_all_manifests<R: Runtime>(runtime: &R, root: &Path) -> Result<Vec<PathBuf>> {
    let mut manifests = Vec::new();

    if !runtime.exists(root) {
        return Ok(manifests);
    }

    for package_path in runtime.read_dir(root)? {
        if is_hidden(&package_path) || !runtime.is_dir(&package_path) {
            continue;
        }
        manifests.extend(find_version_manifests(runtime, &package_path)?);
    }

    manifests.sort();
    Ok(manifests)
}

/// Manifest paths of every installed version inside one package directory.
pub fn find_version_manifests<R: Runtime>(runtime: &R, package_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut manifests = Vec::new();
    if !runtime.exists(package_dir) {
        return Ok(manifests);
    }

    for version_path in runtime.read_dir(package_dir)? {
        if !runtime.is_dir(&version_path) {
            continue;
        }
        let manifest = version_path.join(MANIFEST_FILE);
        if runtime.exists(&manifest) {
            manifests.push(manifest);
        }
    }

    Ok(manifests)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
