//! Elasticsearch version model.
//!
//! Versions have the shape `{major}.{minor}.{patch}[-{label}]`. Precedence
//! only looks at the numeric triple; the label takes part in identity but
//! never in ordering, so `7.14.0-SNAPSHOT` is neither before nor after
//! `7.14.0`. Because of that, [`Version`] does not implement `Ord`:
//! comparisons go through [`Version::gte`] and [`Version::lt`].

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// First version accepting the unified `node.roles` setting.
pub const NODE_ROLES_MIN: Version = Version::new(7, 9, 0);

/// First version supporting the autoscaling annotation.
pub const AUTOSCALING_MIN: Version = Version::new(7, 11, 0);

/// From this version on the autoscaling annotation is rejected.
pub const AUTOSCALING_ANNOTATION_REMOVED: Version = Version::new(8, 0, 0);

/// Minimum version for stack monitoring sidecars.
pub const STACK_MONITORING_MIN: Version = Version::new(7, 14, 0);

/// From this version on beat sidecars run as a non-root user.
pub const BEATS_NON_ROOT_MIN: Version = Version::new(8, 0, 0);

/// First version whose beat configs set the monitoring index field limit.
pub const FIELD_LIMIT_MIN: Version = Version::new(8, 0, 0);

/// First version collecting the `ingest_pipeline` metricset.
pub const INGEST_PIPELINE_MIN: Version = Version::new(8, 7, 0);

/// Error returned when a version string does not match the expected format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version '{input}': expected {{major}}.{{minor}}.{{patch}}[-{{label}}]")]
pub struct ParseVersionError {
    /// The rejected input.
    pub input: String,
}

/// A parsed Elasticsearch version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub label: Option<String>,
}

impl Version {
    /// Build a version without label.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            label: None,
        }
    }

    /// Parse a version string.
    ///
    /// Build metadata (`+build`) is not part of the format and is rejected.
    pub fn parse(input: &str) -> Result<Self, ParseVersionError> {
        let parsed = semver::Version::parse(input).map_err(|_| ParseVersionError {
            input: input.to_string(),
        })?;
        if !parsed.build.is_empty() {
            return Err(ParseVersionError {
                input: input.to_string(),
            });
        }
        Ok(Self {
            major: parsed.major,
            minor: parsed.minor,
            patch: parsed.patch,
            label: (!parsed.pre.is_empty()).then(|| parsed.pre.to_string()),
        })
    }

    /// Compare the numeric triples, ignoring labels.
    pub fn precedence(&self, other: &Version) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }

    /// `self >= other` on precedence.
    pub fn gte(&self, other: &Version) -> bool {
        self.precedence(other) != Ordering::Less
    }

    /// `self < other` on precedence.
    pub fn lt(&self, other: &Version) -> bool {
        self.precedence(other) == Ordering::Less
    }

    /// Whether this version is in the supported-versions table.
    pub fn is_supported(&self) -> bool {
        supported_versions(self).is_some_and(|range| range.contains(self))
    }

    /// Whether a cluster currently running `current` may move to `self`.
    pub fn is_reachable_from(&self, current: &Version) -> bool {
        supported_versions(self).is_some_and(|range| range.contains(current))
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(label) = &self.label {
            write!(f, "-{}", label)?;
        }
        Ok(())
    }
}

/// Half-open `[min, max)` range of versions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Version,
    pub max: Version,
}

impl VersionRange {
    const fn new(min: Version, max: Version) -> Self {
        Self { min, max }
    }

    /// Whether `v` lies in `[min, max)`.
    pub fn contains(&self, v: &Version) -> bool {
        v.gte(&self.min) && v.lt(&self.max)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.min, self.max)
    }
}

/// Versions a node of version `v` can coexist with, keyed by `v.major`.
///
/// Returns `None` for majors the operator does not manage.
pub fn supported_versions(v: &Version) -> Option<VersionRange> {
    match v.major {
        6 => Some(VersionRange::new(
            Version::new(6, 8, 0),
            Version::new(7, 0, 0),
        )),
        7 => Some(VersionRange::new(
            Version::new(6, 8, 0),
            Version::new(8, 0, 0),
        )),
        8 => Some(VersionRange::new(
            Version::new(7, 17, 0),
            Version::new(9, 0, 0),
        )),
        _ => None,
    }
}
