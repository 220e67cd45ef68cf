//! Expansion of a manifest's path and git dependencies into work items.
//!
//! Path dependencies resolve against the owning manifest's directory. Git
//! dependencies are grouped by `(url, branch)` and each group is cloned once,
//! shallowly, under a shared [`CloneRoot`]; every `subdirectory` inside that
//! clone then becomes its own work item. Unresolvable dependencies are
//! collected, never fatal to the rest of the walk.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::error::Result;
use crate::manifest::{GitDependency, Manifest};
use crate::vcs::VersionControl;

/// Depth of the shallow clones made for git dependencies.
pub const CLONE_DEPTH: u32 = 1;

/// Where a work item came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Path,
    Git { url: String, branch: String },
}

/// A resolved package directory containing a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub name: String,
    pub directory: PathBuf,
    pub origin: Origin,
}

/// A dependency that could not be materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDependency {
    pub name: String,
    pub location: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(WorkItem),
    Unresolved(UnresolvedDependency),
}

impl Resolution {
    /// Directory the entry refers to, resolved or not.
    pub fn location(&self) -> &Path {
        match self {
            Resolution::Resolved(item) => &item.directory,
            Resolution::Unresolved(failure) => &failure.location,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resolution::Resolved(item) => &item.name,
            Resolution::Unresolved(failure) => &failure.name,
        }
    }
}

/// Temporary directory holding the clones of one walk.
///
/// Removal is explicit: call [`release`](Self::release) once every stage that
/// works inside the clones is done, or [`keep`](Self::keep) to leave it on disk.
/// Dropping the handle does not delete anything.
#[derive(Debug)]
pub struct CloneRoot {
    path: PathBuf,
    allocated: HashSet<String>,
}

impl CloneRoot {
    /// Creates a fresh, uniquely named directory under `parent`.
    pub fn create_in(parent: &Path) -> Result<Self> {
        let path = parent.join(format!("relkit-clones-{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path)?;
        tracing::debug!("[walker] Created clone root {}", path.display());
        Ok(Self {
            path,
            allocated: HashSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserves a destination for a clone of `branch`.
    ///
    /// The directory name is the sanitized branch; repeated branches get a
    /// numeric suffix so that distinct repositories never share a destination.
    fn allocate(&mut self, branch: &str) -> PathBuf {
        let base = sanitize_branch(branch);
        let mut candidate = base.clone();
        let mut counter = 1;
        while self.allocated.contains(&candidate) {
            counter += 1;
            candidate = format!("{}-{}", base, counter);
        }
        self.allocated.insert(candidate.clone());
        self.path.join(candidate)
    }

    /// Recursively removes the clone root.
    pub fn release(self) -> Result<()> {
        if self.path.exists() {
            fs::remove_dir_all(&self.path)?;
            tracing::info!("[cleanup] Removed {}", self.path.display());
        }
        Ok(())
    }

    /// Leaves the clones on disk and returns their location.
    pub fn keep(self) -> PathBuf {
        tracing::info!("[cleanup] Keeping clones at {}", self.path.display());
        self.path
    }
}

/// Turns a branch name into a single path component.
pub fn sanitize_branch(branch: &str) -> String {
    let sanitized: String = branch
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    match sanitized.trim_matches('.') {
        "" => "default".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Everything a walk produced, in manifest order: path dependencies first,
/// then git dependencies grouped by repository.
#[derive(Debug)]
pub struct Expansion {
    pub entries: Vec<Resolution>,
    pub clone_root: Option<CloneRoot>,
}

impl Expansion {
    pub fn path_items(&self) -> Vec<&Path> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Resolution::Resolved(item) if item.origin == Origin::Path => {
                    Some(item.directory.as_path())
                }
                _ => None,
            })
            .collect()
    }

    pub fn git_items(&self) -> Vec<(&str, &Path)> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Resolution::Resolved(item) if matches!(item.origin, Origin::Git { .. }) => {
                    Some((item.name.as_str(), item.directory.as_path()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<&UnresolvedDependency> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Resolution::Unresolved(failure) => Some(failure),
                Resolution::Resolved(_) => None,
            })
            .collect()
    }

    pub fn all_resolved(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| matches!(entry, Resolution::Resolved(_)))
    }
}

/// Resolves path dependencies of `manifest` without touching the network.
pub fn resolve_path_dependencies(manifest: &Manifest, manifest_name: &str) -> Vec<Resolution> {
    let base = manifest.directory();
    manifest
        .path_dependencies()
        .into_iter()
        .map(|dep| {
            let directory = base.join(&dep.path);
            if directory.join(manifest_name).is_file() {
                Resolution::Resolved(WorkItem {
                    name: dep.name,
                    directory,
                    origin: Origin::Path,
                })
            } else {
                tracing::warn!(
                    "[walker] Path dependency '{}' at {} has no {}",
                    dep.name,
                    directory.display(),
                    manifest_name
                );
                Resolution::Unresolved(UnresolvedDependency {
                    reason: format!("no {} in {}", manifest_name, directory.display()),
                    name: dep.name,
                    location: directory,
                })
            }
        })
        .collect()
}

pub struct DependencyWalker<'a> {
    vcs: &'a dyn VersionControl,
    manifest_name: String,
    clone_parent: PathBuf,
}

impl<'a> DependencyWalker<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        manifest_name: impl Into<String>,
        clone_parent: impl Into<PathBuf>,
    ) -> Self {
        Self {
            vcs,
            manifest_name: manifest_name.into(),
            clone_parent: clone_parent.into(),
        }
    }

    /// Reads the manifest at `manifest_path` and expands its dependencies.
    ///
    /// # Errors
    ///
    /// Only reading the manifest itself is fatal; dependency problems are
    /// reported as [`Resolution::Unresolved`] entries.
    pub fn expand(&self, manifest_path: &Path) -> Result<Expansion> {
        let manifest = Manifest::read(manifest_path)?;
        Ok(self.expand_manifest(&manifest))
    }

    pub fn expand_manifest(&self, manifest: &Manifest) -> Expansion {
        let mut entries = resolve_path_dependencies(manifest, &self.manifest_name);

        let mut groups: IndexMap<(String, String), Vec<GitDependency>> = IndexMap::new();
        for dep in manifest.git_dependencies() {
            groups
                .entry((dep.url.clone(), dep.branch.clone()))
                .or_default()
                .push(dep);
        }

        if groups.is_empty() {
            return Expansion {
                entries,
                clone_root: None,
            };
        }

        let mut clone_root = match CloneRoot::create_in(&self.clone_parent) {
            Ok(root) => root,
            Err(e) => {
                tracing::error!(
                    "[walker] Could not create clone directory in {}: {}",
                    self.clone_parent.display(),
                    e
                );
                for dep in groups.into_values().flatten() {
                    entries.push(Resolution::Unresolved(UnresolvedDependency {
                        location: self.clone_parent.clone(),
                        reason: format!("could not create clone directory: {}", e),
                        name: dep.name,
                    }));
                }
                return Expansion {
                    entries,
                    clone_root: None,
                };
            }
        };

        for ((url, branch), deps) in groups {
            let destination = clone_root.allocate(&branch);
            tracing::info!(
                "[walker] Cloning {}@{} into {} ({} dependenc{})",
                url,
                branch,
                destination.display(),
                deps.len(),
                if deps.len() == 1 { "y" } else { "ies" }
            );

            let clone_error = match self.vcs.clone_repo(&url, &branch, CLONE_DEPTH, &destination) {
                Ok(0) => None,
                Ok(code) => Some(format!("clone of {}@{} exited with code {}", url, branch, code)),
                Err(e) => Some(format!("clone of {}@{} failed: {}", url, branch, e)),
            };

            for dep in deps {
                let directory = if dep.subdirectory.is_empty() {
                    destination.clone()
                } else {
                    destination.join(&dep.subdirectory)
                };

                if !is_confined(&dep.subdirectory) {
                    tracing::error!(
                        "[walker] {}: subdirectory '{}' leaves the repository",
                        dep.name,
                        dep.subdirectory
                    );
                    entries.push(Resolution::Unresolved(UnresolvedDependency {
                        reason: format!(
                            "subdirectory '{}' must be a relative path inside the repository",
                            dep.subdirectory
                        ),
                        name: dep.name,
                        location: destination.clone(),
                    }));
                    continue;
                }

                if let Some(reason) = &clone_error {
                    tracing::error!("[walker] {}: {}", dep.name, reason);
                    entries.push(Resolution::Unresolved(UnresolvedDependency {
                        name: dep.name,
                        location: directory,
                        reason: reason.clone(),
                    }));
                    continue;
                }

                if directory.join(&self.manifest_name).is_file() {
                    entries.push(Resolution::Resolved(WorkItem {
                        name: dep.name,
                        directory,
                        origin: Origin::Git {
                            url: url.clone(),
                            branch: branch.clone(),
                        },
                    }));
                } else {
                    tracing::warn!(
                        "[walker] Subdirectory '{}' of {}@{} has no {}",
                        dep.subdirectory,
                        url,
                        branch,
                        self.manifest_name
                    );
                    entries.push(Resolution::Unresolved(UnresolvedDependency {
                        reason: format!(
                            "no {} in subdirectory '{}' of {}@{}",
                            self.manifest_name, dep.subdirectory, url, branch
                        ),
                        name: dep.name,
                        location: directory,
                    }));
                }
            }
        }

        Expansion {
            entries,
            clone_root: Some(clone_root),
        }
    }
}

/// Whether `subdirectory` stays inside the directory it is joined to.
fn is_confined(subdirectory: &str) -> bool {
    Path::new(subdirectory)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
