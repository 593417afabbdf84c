//! Builders shared by unit tests.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::feed::MockFeedClient;
use crate::package::{
    Dependency, DependencyGroup, PackageIdentity, ResourceMetadata, ResourceVersion,
    VersionConstraint,
};
use crate::registry::RepositoryDescriptor;

/// Write a `.nupkg` with the given entries plus the usual packaging files.
pub fn write_nupkg(path: &Path, files: &[(&str, &str)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options: FileOptions<()> = FileOptions::default();
    let packaging = [
        ("[Content_Types].xml", "<Types/>"),
        ("_rels/.rels", "<Relationships/>"),
        ("package/services/metadata/core-properties/x.psmdcp", "<core/>"),
    ];
    for (name, content) in files.iter().chain(packaging.iter()) {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Write a `.tar.gz` holding exactly the given entries.
pub fn write_tgz(path: &Path, files: &[(&str, &str)]) {
    let enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut tar = tar::Builder::new(enc);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append(&header, content.as_bytes()).unwrap();
    }
    tar.into_inner().unwrap().finish().unwrap();
}

/// Metadata for `id` at `version` from `repository`, with dependencies given
/// as `(id, dependency version text)`.
pub fn package(
    repository: &str,
    id: &str,
    version: &str,
    deps: &[(&str, &str)],
) -> ResourceMetadata {
    let metadata = ResourceMetadata::new(
        PackageIdentity::new(id, ResourceVersion::parse(version).unwrap()),
        repository,
    )
    .with_tags(["PSModule"]);
    if deps.is_empty() {
        return metadata;
    }
    metadata.with_dependencies(DependencyGroup {
        target: None,
        dependencies: deps
            .iter()
            .map(|(id, c)| Dependency::new(*id, VersionConstraint::parse_dependency(c).unwrap()))
            .collect(),
    })
}

/// A feed mock that reports `descriptor` as its repository.
pub fn mock_feed(descriptor: RepositoryDescriptor) -> MockFeedClient {
    let mut feed = MockFeedClient::new();
    feed.expect_repository().return_const(descriptor);
    feed
}
