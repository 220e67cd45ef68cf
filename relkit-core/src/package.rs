//! Package classification.

use std::fmt;

use serde::Serialize;
use crate::manifest::Manifest;

/// Whether a manifest describes a publishable package or only groups others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Package,
    Aggregator,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Package => f.write_str("package"),
            PackageKind::Aggregator => f.write_str("aggregator"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub kind: PackageKind,
    pub name: String,
}

impl Classification {
    pub fn is_aggregator(&self) -> bool {
        self.kind == PackageKind::Aggregator
    }
}

/// Classifies a manifest.
///
/// A manifest is an aggregator when `[tool.poetry].package-mode` is boolean
/// `false` or the string `"false"` in any letter case. Anything else,
/// including an absent key, is a regular package.
pub fn classify(manifest: &Manifest) -> Classification {
    let kind = if manifest.package_mode() {
        PackageKind::Package
    } else {
        PackageKind::Aggregator
    };

    Classification {
        kind,
        name: manifest.name(),
    }
}
