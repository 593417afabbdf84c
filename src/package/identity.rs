//! Package names and identities.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::version::ResourceVersion;

/// A package name. Compared and hashed case-insensitively, displayed as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form, used for directory and lock file names.
    pub fn key(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    /// True if the name contains glob metacharacters.
    pub fn is_pattern(name: &str) -> bool {
        name.contains(['*', '?', '['])
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for PackageId {}

impl Hash for PackageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PackageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A specific version of a specific package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub id: PackageId,
    pub version: ResourceVersion,
}

impl PackageIdentity {
    pub fn new(id: impl Into<PackageId>, version: ResourceVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_package_id_case_insensitive() {
        let a = PackageId::new("Pester");
        let b = PackageId::new("pester");
        assert_eq!(a, b);

        let set: HashSet<PackageId> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(a.to_string(), "Pester");
        assert_eq!(a.key(), "pester");
        assert!(a.matches("PESTER"));
    }

    #[test]
    fn test_identity_equality_uses_normalized_version() {
        let a = PackageIdentity::new("Az.Accounts", ResourceVersion::parse("2.0").unwrap());
        let b = PackageIdentity::new("az.accounts", ResourceVersion::parse("v2.0.0").unwrap());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Az.Accounts 2.0.0");
    }

    #[test]
    fn test_is_pattern() {
        assert!(PackageId::is_pattern("Az.*"));
        assert!(PackageId::is_pattern("Pes?er"));
        assert!(!PackageId::is_pattern("Pester"));
    }
}
