use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

use super::ArchiveExtractor;

/// Extractor for `.tar.gz` / `.tgz` packages.
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    fn extract<R: Runtime>(&self, runtime: &R, archive_path: &Path, extract_to: &Path) -> Result<usize> {
        debug!("Extracting {:?} to {:?}...", archive_path, extract_to);
        let reader = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
        let mut archive = Archive::new(GzDecoder::new(reader));

        runtime.create_dir_all(extract_to)?;
        let mut files = 0;

        let entries = archive
            .entries()
            .with_context(|| format!("Failed to read tar entries from {:?}", archive_path))?;

        for entry in entries {
            let mut entry = entry.context("Failed to read tar entry")?;
            let raw_path = entry.path().context("Invalid tar entry path")?.into_owned();

            let Some(relative) = sanitize(&raw_path) else {
                debug!("Skipping entry with unsafe path {:?}", raw_path);
                continue;
            };
            let full_path = extract_to.join(relative);

            match entry.header().entry_type() {
                EntryType::Directory => runtime.create_dir_all(&full_path)?,
                EntryType::Regular | EntryType::Continuous => {
                    if let Some(parent) = full_path.parent() {
                        runtime.create_dir_all(parent)?;
                    }
                    let mut dest_file = runtime.create_file(&full_path)?;
                    std::io::copy(&mut entry, &mut dest_file)
                        .with_context(|| format!("Failed to extract file {:?}", full_path))?;
                    files += 1;

                    #[cfg(unix)]
                    if let Ok(mode) = entry.header().mode()
                        && let Err(e) = runtime.set_permissions(&full_path, mode)
                    {
                        debug!("Failed to set permissions on {:?}: {}", full_path, e);
                    }
                }
                other => debug!("Skipping {:?} entry {:?}", other, raw_path),
            }
        }

        if files == 0 {
            return Err(anyhow!("Archive {:?} is empty", archive_path));
        }

        info!("Extracted {} files from {:?}", files, archive_path);
        Ok(files)
    }
}

/// Relative path made only of normal components, or `None` if the entry
/// would escape the destination.
fn sanitize(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use crate::test_utils::write_tgz;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_can_handle() {
        let extractor = TarGzExtractor;
        assert!(extractor.can_handle(Path::new("demo.tar.gz")));
        assert!(extractor.can_handle(Path::new("DEMO.TGZ")));
        assert!(!extractor.can_handle(Path::new("demo.nupkg")));
    }

    #[test]
    fn test_extract_keeps_layout() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("demo.tar.gz");
        let extract_path = dir.path().join("out");

        write_tgz(
            &archive_path,
            &[("Demo.psd1", "manifest"), ("lib/helper.ps1", "helper")],
        );

        let files = TarGzExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        assert_eq!(files, 2);
        assert_eq!(fs::read_to_string(extract_path.join("Demo.psd1"))?, "manifest");
        assert_eq!(fs::read_to_string(extract_path.join("lib/helper.ps1"))?, "helper");
        Ok(())
    }

    #[test]
    fn test_extract_corrupted_archive() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("bad.tgz");
        fs::write(&archive_path, "not gzip")?;

        let result = TarGzExtractor.extract(&RealRuntime, &archive_path, &dir.path().join("out"));
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_sanitize_rejects_escaping_paths() {
        assert_eq!(sanitize(Path::new("./a/b.txt")), Some(PathBuf::from("a/b.txt")));
        assert_eq!(sanitize(Path::new("../evil")), None);
        assert_eq!(sanitize(Path::new("/etc/passwd")), None);
        assert_eq!(sanitize(Path::new(".")), None);
    }
}
