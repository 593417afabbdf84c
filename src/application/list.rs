//! List installed resources.

use std::path::PathBuf;

use glob::Pattern;

use crate::error::{ResourceError, ResourceResult};
use crate::package::{Meta, PackageRepository, VersionConstraint};
use crate::runtime::Runtime;
use crate::search::CASE_INSENSITIVE;

/// Installed manifests whose name matches one of `names` (globs allowed;
/// empty means all) and whose version satisfies `version`, sorted by name
/// then newest version first.
#[tracing::instrument(skip(runtime))]
pub fn list_installed<R: Runtime>(
    runtime: &R,
    install_root: PathBuf,
    names: &[String],
    version: Option<&str>,
) -> ResourceResult<Vec<Meta>> {
    let constraint = VersionConstraint::parse_optional(version)?;
    let patterns: Vec<Option<Pattern>> = names.iter().map(|n| Pattern::new(n).ok()).collect();

    let repo = PackageRepository::new(runtime, install_root);
    let all = repo
        .find_all_with_meta()
        .map_err(|e| ResourceError::file_system(repo.install_root().to_path_buf(), &e))?;

    let mut matched: Vec<Meta> = all
        .into_iter()
        .filter(|meta| {
            names.is_empty()
                || names.iter().zip(&patterns).any(|(name, pattern)| match pattern {
                    Some(p) => p.matches_with(meta.name.as_str(), CASE_INSENSITIVE),
                    None => meta.name.matches(name),
                })
        })
        .filter(|meta| constraint.satisfies(&meta.version))
        .collect();

    matched.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| b.version.cmp(&a.version)));
    Ok(matched)
}
