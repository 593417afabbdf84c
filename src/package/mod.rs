//! Package model and local package store.
//!
//! This module provides the version and identity model, feed metadata,
//! the installed manifest, and the on-disk layout of installed packages.

mod discovery;
mod identity;
mod meta;
mod metadata;
mod repository;
mod version;

pub use discovery::{find_all_manifests, find_version_manifests};
pub use identity::{PackageId, PackageIdentity};
pub use meta::Meta;
pub use metadata::{
    Capability, Dependency, DependencyGroup, ResourceKind, ResourceMetadata,
};
pub use repository::{MANIFEST_FILE, PackageRepository};
pub use version::{
    ResourceVersion, VersionConstraint, VersionRange, VersionSelector, Versioned,
};
