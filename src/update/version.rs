//! Version parsing and comparison.
//!
//! Release descriptors often carry short versions (`10.4`) or a `v` prefix.
//! Both are normalised before handing the string to [`semver`].

use crate::error::UpdaterError;
use std::fmt;
use std::str::FromStr;

/// A parsed application version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(semver::Version);

impl Version {
    /// Build a version from its three numeric components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// The underlying semver value.
    pub fn as_semver(&self) -> &semver::Version {
        &self.0
    }
}

impl FromStr for Version {
    type Err = UpdaterError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        if body.is_empty() {
            return Err(UpdaterError::Version("empty version string".to_owned()));
        }

        // Split off pre-release/build metadata so padding only touches the core.
        let core_end = body.find(['-', '+']).unwrap_or(body.len());
        let (core, suffix) = body.split_at(core_end);
        let dots = core.matches('.').count();
        let padded = match dots {
            0 => format!("{core}.0.0{suffix}"),
            1 => format!("{core}.0{suffix}"),
            _ => body.to_owned(),
        };

        semver::Version::parse(&padded)
            .map(Self)
            .map_err(|e| UpdaterError::Version(format!("invalid version {raw:?}: {e}")))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Decides whether a server version should be offered as an update.
pub trait VersionComparator: Send + Sync {
    /// Returns `true` when `latest` should replace `current`.
    fn is_newer(&self, current: &Version, latest: &Version) -> bool;
}

/// Strict semver ordering: only a greater version is an update.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverComparator;

impl VersionComparator for SemverComparator {
    fn is_newer(&self, current: &Version, latest: &Version) -> bool {
        latest.as_semver() > current.as_semver()
    }
}
