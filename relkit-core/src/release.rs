//! Development-release version arithmetic and version updates across manifests.
//!
//! Versions follow the `X.Y.Z` / `X.Y.Z.devN` convention: bumping the major or
//! minor number starts a new development series at `dev1`, patch bumps advance
//! the development counter, and finalizing drops the marker.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use semver::{Prerelease, Version};

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::reporter::{PipelineReporter, SilentReporter};

static VERSION_PATTERN: Lazy<Result<Regex>> = Lazy::new(|| {
    Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)(?:[.\-_]?dev(\d*))?$").map_err(|e| Error::InvalidVersion {
        version: String::new(),
        message: format!("invalid version pattern: {}", e),
    })
});

/// Kind of version change applied by [`bump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BumpKind {
    /// `X.Y.Z` -> `(X+1).0.0.dev1`
    Major,
    /// `X.Y.Z` -> `X.(Y+1).0.dev1`
    Minor,
    /// `X.Y.Z.devN` -> `X.Y.Z.dev(N+1)`, `X.Y.Z` -> `X.Y.(Z+1).dev1`
    Patch,
    /// `X.Y.Z.devN` -> `X.Y.Z`
    Finalize,
}

impl BumpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BumpKind::Major => "major",
            BumpKind::Minor => "minor",
            BumpKind::Patch => "patch",
            BumpKind::Finalize => "finalize",
        }
    }
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BumpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(BumpKind::Major),
            "minor" => Ok(BumpKind::Minor),
            "patch" => Ok(BumpKind::Patch),
            "finalize" => Ok(BumpKind::Finalize),
            _ => Err(Error::InvalidArguments(format!(
                "bump kind must be one of major, minor, patch, finalize; got '{}'",
                s
            ))),
        }
    }
}

/// A parsed `X.Y.Z[.devN]` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub dev: Option<u64>,
}

impl DevVersion {
    pub fn new(major: u64, minor: u64, patch: u64, dev: Option<u64>) -> Self {
        Self {
            major,
            minor,
            patch,
            dev,
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidVersion {
            version: input.to_string(),
            message: message.to_string(),
        };

        let pattern = VERSION_PATTERN.as_ref().map_err(|e| invalid(&e.to_string()))?;
        let captures = pattern
            .captures(input.trim())
            .ok_or_else(|| invalid("expected X.Y.Z or X.Y.Z.devN"))?;

        let number = |index: usize| -> Result<u64> {
            captures
                .get(index)
                .map_or("", |m| m.as_str())
                .parse::<u64>()
                .map_err(|e| invalid(&e.to_string()))
        };

        let dev = match captures.get(4) {
            None => None,
            // A bare `dev` marker counts as dev0.
            Some(m) if m.as_str().is_empty() => Some(0),
            Some(_) => Some(number(4)?),
        };

        Ok(Self::new(number(1)?, number(2)?, number(3)?, dev))
    }

    pub fn is_dev(&self) -> bool {
        self.dev.is_some()
    }

    /// The same version expressed in semantic-version ordering, with the
    /// development marker as a `dev.N` pre-release.
    pub fn to_semver(&self) -> Version {
        let mut version = Version::new(self.major, self.minor, self.patch);
        if let Some(dev) = self.dev {
            // "dev.N" is always a valid pre-release identifier.
            version.pre = Prerelease::new(&format!("dev.{}", dev)).unwrap_or(Prerelease::EMPTY);
        }
        version
    }
}

impl fmt::Display for DevVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(dev) = self.dev {
            write!(f, ".dev{}", dev)?;
        }
        Ok(())
    }
}

impl FromStr for DevVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialOrd for DevVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DevVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_semver().cmp(&other.to_semver())
    }
}

/// Computes the version following `current` for the given bump kind.
///
/// # Errors
///
/// Returns [`Error::InvalidVersion`] if `current` does not parse or a
/// component would overflow, and
/// [`Error::NotInDevelopment`] when finalizing a version without a dev marker.
pub fn bump(current: &str, kind: BumpKind) -> Result<String> {
    let version = DevVersion::parse(current)?;

    let increment = |value: u64| {
        value.checked_add(1).ok_or_else(|| Error::InvalidVersion {
            version: current.to_string(),
            message: "version component is too large to increment".to_string(),
        })
    };

    let next = match kind {
        BumpKind::Major => DevVersion::new(increment(version.major)?, 0, 0, Some(1)),
        BumpKind::Minor => DevVersion::new(version.major, increment(version.minor)?, 0, Some(1)),
        BumpKind::Patch => match version.dev {
            Some(dev) => {
                DevVersion::new(version.major, version.minor, version.patch, Some(increment(dev)?))
            }
            None => DevVersion::new(version.major, version.minor, increment(version.patch)?, Some(1)),
        },
        BumpKind::Finalize => {
            if !version.is_dev() {
                return Err(Error::NotInDevelopment(current.to_string()));
            }
            DevVersion::new(version.major, version.minor, version.patch, None)
        }
    };

    Ok(next.to_string())
}

/// Rejects `target` if it orders below `current`.
pub fn validate_not_lower(current: &str, target: &str) -> Result<()> {
    let current_version = DevVersion::parse(current)?;
    let target_version = DevVersion::parse(target)?;
    if target_version < current_version {
        return Err(Error::DowngradeRejected {
            current: current.to_string(),
            target: target.to_string(),
        });
    }
    Ok(())
}

/// How a version update computes the new version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionChange {
    Bump(BumpKind),
    Set(String),
}

impl VersionChange {
    pub fn apply(&self, current: &str) -> Result<String> {
        let next = match self {
            VersionChange::Bump(kind) => bump(current, *kind)?,
            VersionChange::Set(version) => DevVersion::parse(version)?.to_string(),
        };
        validate_not_lower(current, &next)?;
        Ok(next)
    }
}

/// One manifest's pending version change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionUpdate {
    pub file: PathBuf,
    pub name: String,
    pub old_version: String,
    pub new_version: String,
}

#[derive(Debug, Clone, Default)]
pub struct VersionPlan {
    pub updates: Vec<VersionUpdate>,
}

/// Plans and applies version changes across manifests.
///
/// Every manifest is planned before any is written, so an invalid version in
/// one manifest leaves all of them untouched.
pub struct VersionEngine {
    dry_run: bool,
    reporter: Arc<dyn PipelineReporter>,
}

impl Default for VersionEngine {
    fn default() -> Self {
        Self::new(false, Arc::new(SilentReporter))
    }
}

impl VersionEngine {
    pub fn new(dry_run: bool, reporter: Arc<dyn PipelineReporter>) -> Self {
        Self { dry_run, reporter }
    }

    /// # Errors
    ///
    /// Returns an error if a manifest cannot be read, declares no version, or
    /// the change is invalid or would lower its version.
    pub fn plan(&self, manifests: &[PathBuf], change: &VersionChange) -> Result<VersionPlan> {
        let mut plan = VersionPlan::default();

        for path in manifests {
            let manifest = Manifest::read(path)?;
            let old_version = manifest.version().ok_or_else(|| Error::ManifestStructure {
                path: path.clone(),
                message: "no version found under [tool.poetry]".to_string(),
            })?;
            let new_version = change.apply(&old_version)?;

            plan.updates.push(VersionUpdate {
                file: path.clone(),
                name: manifest.name(),
                old_version,
                new_version,
            });
        }

        Ok(plan)
    }

    pub fn execute(&self, plan: &VersionPlan) -> Result<()> {
        for update in &plan.updates {
            if !self.dry_run {
                write_version(&update.file, &update.new_version)?;
            }
            tracing::info!(
                "[version] {}: {} -> {}",
                update.file.display(),
                update.old_version,
                update.new_version
            );
            self.reporter.version_changed(update, self.dry_run);
        }
        Ok(())
    }
}

fn write_version(path: &Path, version: &str) -> Result<()> {
    let mut manifest = Manifest::read(path)?;
    manifest.set_version(version)?;
    manifest.write()
}
