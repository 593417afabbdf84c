//! Unpacking downloaded package archives.

mod tar_gz;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Result, bail};
use std::path::Path;

pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// Archive container, recognised by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.nupkg` and `.zip`
    Zip,
    /// `.tar.gz` and `.tgz`
    TarGz,
}

impl ArchiveFormat {
    pub fn detect(archive_path: &Path) -> Option<Self> {
        if ZipExtractor.can_handle(archive_path) {
            Some(Self::Zip)
        } else if TarGzExtractor.can_handle(archive_path) {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

pub trait ArchiveExtractor: Send + Sync {
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the archive into `extract_to`, keeping its internal layout.
    /// Returns the number of files written.
    fn extract<R: Runtime>(&self, runtime: &R, archive_path: &Path, extract_to: &Path) -> Result<usize>;
}

/// Extracts any package archive a feed may serve.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageExtractor;

impl ArchiveExtractor for PackageExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        ArchiveFormat::detect(archive_path).is_some()
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime>(&self, runtime: &R, archive_path: &Path, extract_to: &Path) -> Result<usize> {
        match ArchiveFormat::detect(archive_path) {
            Some(ArchiveFormat::Zip) => ZipExtractor.extract(runtime, archive_path, extract_to),
            Some(ArchiveFormat::TarGz) => TarGzExtractor.extract(runtime, archive_path, extract_to),
            None => bail!("{:?} is not a package archive", archive_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_detect() {
        assert_eq!(
            ArchiveFormat::detect(Path::new("Az.Accounts.2.7.1.nupkg")),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            ArchiveFormat::detect(Path::new("scripts.ZIP")),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            ArchiveFormat::detect(Path::new("Pester.5.5.0.tar.gz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::detect(Path::new("Pester.tgz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(ArchiveFormat::detect(Path::new("Pester.psd1")), None);
        assert!(!PackageExtractor.can_handle(Path::new("resource.json")));
    }

    #[test]
    fn test_extract_nupkg() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("Demo.1.0.0.nupkg");
        let extract_path = dir.path().join("extracted");

        let mut zip = ::zip::ZipWriter::new(File::create(&archive_path)?);
        zip.start_file("Demo.psm1", ::zip::write::FileOptions::<()>::default())?;
        zip.write_all(b"function Get-Demo {}")?;
        zip.finish()?;

        let written = PackageExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        assert_eq!(written, 1);
        assert_eq!(
            fs::read_to_string(extract_path.join("Demo.psm1"))?,
            "function Get-Demo {}"
        );
        Ok(())
    }

    #[test]
    fn test_extract_rejects_unknown_file() {
        let err = PackageExtractor
            .extract(&RealRuntime, Path::new("/tmp/Demo.psd1"), Path::new("/tmp/out"))
            .unwrap_err();
        assert!(err.to_string().contains("is not a package archive"));
    }
}
