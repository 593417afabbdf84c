//! Version model and version selection.
//!
//! Versions follow the feed convention of up to four numeric components
//! (`major.minor.patch.revision`) plus an optional prerelease label.
//! Constraints use interval notation (`[1.0,2.0)`, `(,3.0]`, `[1.2.0]`).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use semver::Prerelease;
use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, ResourceResult};

/// A normalized package version.
///
/// `1.0`, `1.0.0`, `v1.0.0.0` all compare equal. Prerelease labels are
/// lowercased and compared with semver precedence; a stable version ranks
/// above any prerelease of the same base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    pre: Option<Prerelease>,
}

impl ResourceVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            pre: None,
        }
    }

    pub fn parse(input: &str) -> ResourceResult<Self> {
        let trimmed = input.trim();
        let stripped = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        // Build metadata never participates in comparison
        let without_build = stripped.split('+').next().unwrap_or_default();

        let (numbers, label) = match without_build.split_once('-') {
            Some((numbers, label)) => (numbers, Some(label)),
            None => (without_build, None),
        };

        if numbers.is_empty() {
            return Err(ResourceError::invalid_constraint(input, "empty version"));
        }

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() > 4 {
            return Err(ResourceError::invalid_constraint(
                input,
                "a version has at most four numeric components",
            ));
        }

        let mut components = [0u64; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            *slot = part.parse::<u64>().map_err(|_| {
                ResourceError::invalid_constraint(
                    input,
                    format!("'{}' is not a numeric version component", part),
                )
            })?;
        }

        let pre = match label {
            Some(label) => {
                let pre = Prerelease::new(&label.to_ascii_lowercase()).map_err(|e| {
                    ResourceError::invalid_constraint(input, format!("bad prerelease label: {}", e))
                })?;
                if pre.is_empty() {
                    return Err(ResourceError::invalid_constraint(
                        input,
                        "empty prerelease label",
                    ));
                }
                Some(pre)
            }
            None => None,
        };

        Ok(Self {
            major: components[0],
            minor: components[1],
            patch: components[2],
            revision: components[3],
            pre,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    pub fn prerelease(&self) -> Option<&str> {
        self.pre.as_ref().map(|p| p.as_str())
    }

    fn numeric(&self) -> (u64, u64, u64, u64) {
        (self.major, self.minor, self.patch, self.revision)
    }
}

impl PartialEq for ResourceVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ResourceVersion {}

impl Hash for ResourceVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.numeric().hash(state);
        self.pre.hash(state);
    }
}

impl PartialOrd for ResourceVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric()
            .cmp(&other.numeric())
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl FromStr for ResourceVersion {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceVersion {
    type Error = ResourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceVersion> for String {
    fn from(value: ResourceVersion) -> Self {
        value.to_string()
    }
}

/// An interval of versions. A missing bound is unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Option<ResourceVersion>,
    pub min_inclusive: bool,
    pub max: Option<ResourceVersion>,
    pub max_inclusive: bool,
}

impl VersionRange {
    /// `v <= x`, the meaning of a bare version in a dependency declaration.
    pub fn at_least(min: ResourceVersion) -> Self {
        Self {
            min: Some(min),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    pub fn contains(&self, version: &ResourceVersion) -> bool {
        let above_min = match &self.min {
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
            None => true,
        };
        let below_max = match &self.max {
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
            None => true,
        };
        above_min && below_max
    }

    fn is_empty(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => match min.cmp(max) {
                Ordering::Greater => true,
                Ordering::Equal => !(self.min_inclusive && self.max_inclusive),
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    fn intersect(&self, other: &VersionRange) -> VersionRange {
        let (min, min_inclusive) = match (&self.min, &other.min) {
            (None, None) => (None, false),
            (Some(a), None) => (Some(a.clone()), self.min_inclusive),
            (None, Some(b)) => (Some(b.clone()), other.min_inclusive),
            (Some(a), Some(b)) => match a.cmp(b) {
                Ordering::Greater => (Some(a.clone()), self.min_inclusive),
                Ordering::Less => (Some(b.clone()), other.min_inclusive),
                Ordering::Equal => (
                    Some(a.clone()),
                    self.min_inclusive && other.min_inclusive,
                ),
            },
        };
        let (max, max_inclusive) = match (&self.max, &other.max) {
            (None, None) => (None, false),
            (Some(a), None) => (Some(a.clone()), self.max_inclusive),
            (None, Some(b)) => (Some(b.clone()), other.max_inclusive),
            (Some(a), Some(b)) => match a.cmp(b) {
                Ordering::Less => (Some(a.clone()), self.max_inclusive),
                Ordering::Greater => (Some(b.clone()), other.max_inclusive),
                Ordering::Equal => (
                    Some(a.clone()),
                    self.max_inclusive && other.max_inclusive,
                ),
            },
        };
        VersionRange {
            min,
            min_inclusive,
            max,
            max_inclusive,
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.min.is_some() && self.min_inclusive {
            '['
        } else {
            '('
        };
        let close = if self.max.is_some() && self.max_inclusive {
            ']'
        } else {
            ')'
        };
        let min = self.min.as_ref().map(|v| v.to_string()).unwrap_or_default();
        let max = self.max.as_ref().map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}{}, {}{}", open, min, max, close)
    }
}

/// Which versions of a package a request accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionConstraint {
    Exact(ResourceVersion),
    Range(VersionRange),
    /// Every version, newest first.
    Wildcard,
    /// Only the latest stable version.
    #[default]
    Unconstrained,
}

impl VersionConstraint {
    /// Parse a user-supplied version request.
    ///
    /// Empty input is `Unconstrained`, `*` is `Wildcard`, a bare version is
    /// `Exact`, and bracketed input is interval notation.
    pub fn parse(input: &str) -> ResourceResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::Unconstrained);
        }
        if trimmed == "*" {
            return Ok(Self::Wildcard);
        }
        if is_interval(trimmed) {
            return parse_interval(input, trimmed);
        }
        Ok(Self::Exact(ResourceVersion::parse(trimmed)?))
    }

    /// Parse a version request that may be absent.
    pub fn parse_optional(input: Option<&str>) -> ResourceResult<Self> {
        input.map_or(Ok(Self::Unconstrained), Self::parse)
    }

    /// Parse a dependency declaration, where a bare version is a minimum.
    pub fn parse_dependency(input: &str) -> ResourceResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::Unconstrained);
        }
        if trimmed == "*" {
            return Ok(Self::Wildcard);
        }
        if is_interval(trimmed) {
            return parse_interval(input, trimmed);
        }
        Ok(Self::Range(VersionRange::at_least(ResourceVersion::parse(
            trimmed,
        )?)))
    }

    pub fn satisfies(&self, version: &ResourceVersion) -> bool {
        match self {
            Self::Exact(v) => v == version,
            Self::Range(range) => range.contains(version),
            Self::Wildcard | Self::Unconstrained => true,
        }
    }

    /// True for constraints that name specific versions (`Exact` and `Range`).
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Exact(_) | Self::Range(_))
    }

    /// An exact prerelease version. Feeds must be asked for prereleases to
    /// return it.
    pub fn names_prerelease(&self) -> bool {
        matches!(self, Self::Exact(v) if v.is_prerelease())
    }

    /// Most restrictive constraint accepted by both, or `None` when no
    /// version can satisfy both.
    pub fn intersect(&self, other: &VersionConstraint) -> Option<VersionConstraint> {
        match (self, other) {
            (Self::Unconstrained, Self::Unconstrained | Self::Wildcard)
            | (Self::Wildcard, Self::Unconstrained) => Some(Self::Unconstrained),
            (Self::Wildcard, Self::Wildcard) => Some(Self::Wildcard),
            (Self::Unconstrained | Self::Wildcard, constraint)
            | (constraint, Self::Unconstrained | Self::Wildcard) => Some(constraint.clone()),
            (Self::Exact(v), constraint) | (constraint, Self::Exact(v)) => {
                constraint.satisfies(v).then(|| Self::Exact(v.clone()))
            }
            (Self::Range(a), Self::Range(b)) => {
                let merged = a.intersect(b);
                if merged.is_empty() {
                    return None;
                }
                match (&merged.min, &merged.max) {
                    (Some(min), Some(max)) if min == max => Some(Self::Exact(min.clone())),
                    _ => Some(Self::Range(merged)),
                }
            }
        }
    }

    /// Human-readable form for messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Unconstrained => "latest".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "[{}]", v),
            Self::Range(range) => write!(f, "{}", range),
            Self::Wildcard => write!(f, "*"),
            Self::Unconstrained => Ok(()),
        }
    }
}

fn is_interval(input: &str) -> bool {
    (input.starts_with('[') || input.starts_with('('))
        && (input.ends_with(']') || input.ends_with(')'))
}

fn parse_interval(original: &str, input: &str) -> ResourceResult<VersionConstraint> {
    let min_inclusive = input.starts_with('[');
    let max_inclusive = input.ends_with(']');
    let inner = &input[1..input.len() - 1];

    let Some((low, high)) = inner.split_once(',') else {
        // `[1.0]` pins a single version; `(1.0)` matches nothing.
        if min_inclusive && max_inclusive && !inner.trim().is_empty() {
            return Ok(VersionConstraint::Exact(ResourceVersion::parse(inner)?));
        }
        return Err(ResourceError::invalid_constraint(
            original,
            "a single-version range must use square brackets",
        ));
    };

    if high.contains(',') {
        return Err(ResourceError::invalid_constraint(
            original,
            "a range has exactly two bounds",
        ));
    }

    let low = low.trim();
    let high = high.trim();
    if low.is_empty() && high.is_empty() {
        return Err(ResourceError::invalid_constraint(
            original,
            "a range needs at least one bound",
        ));
    }

    let min = (!low.is_empty())
        .then(|| ResourceVersion::parse(low))
        .transpose()?;
    let max = (!high.is_empty())
        .then(|| ResourceVersion::parse(high))
        .transpose()?;

    let range = VersionRange {
        min_inclusive: min_inclusive && min.is_some(),
        min,
        max_inclusive: max_inclusive && max.is_some(),
        max,
    };

    if range.is_empty() {
        return Err(ResourceError::invalid_constraint(
            original,
            "the lower bound is above the upper bound",
        ));
    }

    match (&range.min, &range.max) {
        (Some(min), Some(max)) if min == max => Ok(VersionConstraint::Exact(min.clone())),
        _ => Ok(VersionConstraint::Range(range)),
    }
}

/// Anything that carries a version and can be selected by constraint.
pub trait Versioned {
    fn version(&self) -> &ResourceVersion;
}

impl Versioned for ResourceVersion {
    fn version(&self) -> &ResourceVersion {
        self
    }
}

/// Version selector - pure functions over candidate lists.
pub struct VersionSelector;

impl VersionSelector {
    /// Select the candidates accepted by `constraint`, newest first.
    ///
    /// Duplicate versions collapse to their first occurrence. Prereleases
    /// are dropped unless `include_prerelease` is set, except that an exact
    /// request for a prerelease returns it.
    pub fn select<T: Versioned + Clone>(
        candidates: &[T],
        constraint: &VersionConstraint,
        include_prerelease: bool,
    ) -> Vec<T> {
        let mut unique: Vec<T> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !unique.iter().any(|u| u.version() == candidate.version()) {
                unique.push(candidate.clone());
            }
        }

        let allowed = |c: &T| include_prerelease || !c.version().is_prerelease();

        let mut selected: Vec<T> = match constraint {
            VersionConstraint::Exact(v) => unique.into_iter().filter(|c| c.version() == v).collect(),
            VersionConstraint::Range(range) => unique
                .into_iter()
                .filter(|c| range.contains(c.version()) && allowed(c))
                .collect(),
            VersionConstraint::Wildcard => unique.into_iter().filter(|c| allowed(c)).collect(),
            VersionConstraint::Unconstrained => unique
                .into_iter()
                .filter(|c| allowed(c))
                .max_by(|a, b| a.version().cmp(b.version()))
                .into_iter()
                .collect(),
        };

        selected.sort_by(|a, b| b.version().cmp(a.version()));
        selected
    }

    /// The single best candidate for `constraint`.
    pub fn best<T: Versioned + Clone>(
        candidates: &[T],
        constraint: &VersionConstraint,
        include_prerelease: bool,
    ) -> Option<T> {
        Self::select(candidates, constraint, include_prerelease)
            .into_iter()
            .next()
    }
}
