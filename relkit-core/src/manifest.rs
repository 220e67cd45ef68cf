//! Structure-preserving access to `pyproject.toml` manifests.
//!
//! Manifests are held as a [`toml_edit::DocumentMut`] so that comments, key
//! ordering and formatting of untouched sections survive a read/modify/write
//! cycle byte for byte. Only the Poetry layout (`[tool.poetry]`) is required;
//! PEP 621 `[project]` metadata is consulted as a fallback for name and version.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use toml_edit::{DocumentMut, InlineTable, Item, TableLike, Value};

use crate::error::{Error, Result};
use crate::outcome::{ItemOutcome, StageReport};

/// File name of the manifest the tool operates on.
pub const DEFAULT_MANIFEST_NAME: &str = "pyproject.toml";

/// Branch used for git dependencies that do not name one.
pub const DEFAULT_BRANCH: &str = "main";

/// Package name reported when a manifest does not declare one.
pub const UNKNOWN_NAME: &str = "unknown";

/// Where a dependency is sourced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// A plain version constraint resolved from a package index.
    Registry(String),
    /// A local package, relative to the owning manifest's directory.
    Path(PathBuf),
    /// A package living in a git repository.
    Git(GitSource),
    /// An entry that declares both `path` and `git`.
    Conflicting,
}

/// Git coordinates of a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    pub url: String,
    pub branch: String,
    pub subdirectory: String,
    pub optional: bool,
}

/// A named entry of `[tool.poetry.dependencies]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub source: DependencySource,
}

/// A git dependency flattened with its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitDependency {
    pub name: String,
    pub url: String,
    pub branch: String,
    pub subdirectory: String,
    pub optional: bool,
}

/// A path dependency flattened with its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDependency {
    pub name: String,
    pub path: PathBuf,
}

impl DependencySource {
    fn from_item(item: &Item) -> Self {
        if let Some(constraint) = item.as_str() {
            return DependencySource::Registry(constraint.to_string());
        }

        let Some(table) = item.as_table_like() else {
            let raw = item
                .as_value()
                .map(|v| v.to_string().trim().to_string())
                .unwrap_or_default();
            return DependencySource::Registry(raw);
        };

        let path = table.get("path").and_then(Item::as_str);
        let git = table.get("git").and_then(Item::as_str);

        match (path, git) {
            (Some(_), Some(_)) => DependencySource::Conflicting,
            (Some(path), None) => DependencySource::Path(PathBuf::from(path)),
            (None, Some(url)) => DependencySource::Git(GitSource {
                url: url.to_string(),
                branch: table
                    .get("branch")
                    .and_then(Item::as_str)
                    .unwrap_or(DEFAULT_BRANCH)
                    .to_string(),
                subdirectory: table
                    .get("subdirectory")
                    .and_then(Item::as_str)
                    .unwrap_or_default()
                    .to_string(),
                optional: table
                    .get("optional")
                    .and_then(Item::as_bool)
                    .unwrap_or(false),
            }),
            (None, None) => DependencySource::Registry(
                table
                    .get("version")
                    .and_then(Item::as_str)
                    .unwrap_or("*")
                    .to_string(),
            ),
        }
    }
}

/// A parsed manifest bound to the path it was read from.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    doc: DocumentMut,
}

impl Manifest {
    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManifestNotFound`] if the file does not exist,
    /// [`Error::ManifestParse`] if it is not valid TOML and
    /// [`Error::ManifestStructure`] if `[tool.poetry]` is missing.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::ManifestNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let manifest = Self::parse_str(&content, path)?;
        manifest.validate_structure()?;
        Ok(manifest)
    }

    /// Checks that the `[tool.poetry]` table is present.
    pub fn validate_structure(&self) -> Result<()> {
        self.poetry().map(|_| ())
    }

    /// Parses manifest text without requiring any particular table.
    ///
    /// `origin` is recorded as the manifest's path and used in error messages.
    pub fn parse_str(content: &str, origin: impl Into<PathBuf>) -> Result<Self> {
        let path = origin.into();
        let doc = content
            .parse::<DocumentMut>()
            .map_err(|e| Error::ManifestParse {
                path: path.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the manifest; relative dependency paths resolve against it.
    pub fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn poetry(&self) -> Result<&dyn TableLike> {
        self.doc
            .get("tool")
            .and_then(|tool| tool.get("poetry"))
            .and_then(Item::as_table_like)
            .ok_or_else(|| Error::ManifestStructure {
                path: self.path.clone(),
                message: "missing [tool.poetry] table".to_string(),
            })
    }

    fn poetry_mut(&mut self) -> Result<&mut dyn TableLike> {
        let path = self.path.clone();
        self.doc
            .get_mut("tool")
            .and_then(|tool| tool.get_mut("poetry"))
            .and_then(Item::as_table_like_mut)
            .ok_or_else(|| Error::ManifestStructure {
                path,
                message: "missing [tool.poetry] table".to_string(),
            })
    }

    fn project_field(&self, key: &str) -> Option<&str> {
        self.doc
            .get("project")
            .and_then(|project| project.get(key))
            .and_then(Item::as_str)
    }

    /// Returns a raw `[tool.poetry]` field.
    pub fn poetry_field(&self, key: &str) -> Option<&Item> {
        self.poetry().ok().and_then(|poetry| poetry.get(key))
    }

    /// Package name, or `"unknown"` when neither Poetry nor PEP 621 metadata declares one.
    pub fn name(&self) -> String {
        self.poetry_field("name")
            .and_then(Item::as_str)
            .or_else(|| self.project_field("name"))
            .unwrap_or(UNKNOWN_NAME)
            .to_string()
    }

    /// Declared version, if any.
    pub fn version(&self) -> Option<String> {
        self.poetry_field("version")
            .and_then(Item::as_str)
            .or_else(|| self.project_field("version"))
            .map(str::to_string)
    }

    /// `[tool.poetry].package-mode`; `false` only for boolean `false` or the
    /// string `"false"` in any case, `true` otherwise.
    pub fn package_mode(&self) -> bool {
        match self.poetry_field("package-mode") {
            Some(item) => match (item.as_bool(), item.as_str()) {
                (Some(flag), _) => flag,
                (None, Some(text)) => !text.eq_ignore_ascii_case("false"),
                _ => true,
            },
            None => true,
        }
    }

    /// Sets `[tool.poetry].version`, keeping the surrounding formatting.
    pub fn set_version(&mut self, version: &str) -> Result<()> {
        let poetry = self.poetry_mut()?;
        match poetry.get_mut("version") {
            Some(item) => replace_value(item, Value::from(version)),
            None => {
                poetry.insert("version", toml_edit::value(version));
            }
        }
        Ok(())
    }

    fn dependency_table(&self) -> Option<&dyn TableLike> {
        self.poetry_field("dependencies")
            .and_then(Item::as_table_like)
    }

    fn dependency_table_mut(&mut self) -> Result<&mut dyn TableLike> {
        let path = self.path.clone();
        self.poetry_mut()?
            .get_mut("dependencies")
            .and_then(Item::as_table_like_mut)
            .ok_or_else(|| Error::ManifestStructure {
                path,
                message: "missing [tool.poetry.dependencies] table".to_string(),
            })
    }

    /// All entries of `[tool.poetry.dependencies]` in declaration order.
    pub fn dependencies(&self) -> Vec<Dependency> {
        let Some(table) = self.dependency_table() else {
            return Vec::new();
        };

        table
            .iter()
            .map(|(name, item)| Dependency {
                name: name.to_string(),
                source: DependencySource::from_item(item),
            })
            .collect()
    }

    /// Names of every declared dependency.
    pub fn dependency_names(&self) -> HashSet<String> {
        self.dependency_table()
            .map(|table| table.iter().map(|(name, _)| name.to_string()).collect())
            .unwrap_or_default()
    }

    pub fn path_dependencies(&self) -> Vec<PathDependency> {
        self.dependencies()
            .into_iter()
            .filter_map(|dep| match dep.source {
                DependencySource::Path(path) => Some(PathDependency {
                    name: dep.name,
                    path,
                }),
                _ => None,
            })
            .collect()
    }

    pub fn git_dependencies(&self) -> Vec<GitDependency> {
        self.dependencies()
            .into_iter()
            .filter_map(|dep| match dep.source {
                DependencySource::Git(git) => Some(GitDependency {
                    name: dep.name,
                    url: git.url,
                    branch: git.branch,
                    subdirectory: git.subdirectory,
                    optional: git.optional,
                }),
                _ => None,
            })
            .collect()
    }

    /// The `[tool.poetry.extras]` section, or `None` if the manifest has none.
    pub fn extras(&self) -> Option<IndexMap<String, Vec<String>>> {
        let table = self.poetry_field("extras")?.as_table_like()?;
        Some(
            table
                .iter()
                .map(|(group, item)| {
                    let members = item
                        .as_array()
                        .map(|array| {
                            array
                                .iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    (group.to_string(), members)
                })
                .collect(),
        )
    }

    /// Replaces a dependency entry with `entry`, keeping its position and decoration.
    pub fn replace_dependency(&mut self, name: &str, entry: InlineTable) -> Result<()> {
        let path = self.path.clone();
        let table = self.dependency_table_mut()?;
        match table.get_mut(name) {
            Some(item) => replace_value(item, Value::InlineTable(entry)),
            None => {
                return Err(Error::ManifestStructure {
                    path,
                    message: format!("dependency '{}' is not declared", name),
                })
            }
        }
        Ok(())
    }

    /// Makes the `optional` flag of a table-style dependency match `optional`.
    ///
    /// Nothing is written when the entry already agrees, so repeated calls are stable.
    pub fn set_dependency_optional(&mut self, name: &str, optional: bool) -> Result<()> {
        let path = self.path.clone();
        let entry = self
            .dependency_table_mut()?
            .get_mut(name)
            .and_then(Item::as_table_like_mut)
            .ok_or_else(|| Error::ManifestStructure {
                path,
                message: format!("dependency '{}' is not a table", name),
            })?;

        let current = entry.get("optional").and_then(Item::as_bool);
        if optional && current != Some(true) {
            entry.insert("optional", toml_edit::value(true));
        } else if !optional && current == Some(true) {
            entry.remove("optional");
        }
        Ok(())
    }

    /// Drops extras members that no longer name a declared dependency.
    ///
    /// A manifest without an extras section is left untouched.
    pub fn prune_extras(&mut self) -> Result<()> {
        let names = self.dependency_names();
        let Some(extras) = self
            .poetry_mut()?
            .get_mut("extras")
            .and_then(Item::as_table_like_mut)
        else {
            return Ok(());
        };

        for (_, item) in extras.iter_mut() {
            if let Some(array) = item.as_array_mut() {
                array.retain(|member| member.as_str().map_or(true, |n| names.contains(n)));
            }
        }
        Ok(())
    }

    /// Rewrites every path dependency into a `^version` constraint.
    ///
    /// Keys other than `path` and `version` are carried over. Returns the
    /// names of the rewritten dependencies.
    pub fn pin_path_dependencies(&mut self, version: &str) -> Result<Vec<String>> {
        let pinned: Vec<String> = self
            .path_dependencies()
            .into_iter()
            .map(|dep| dep.name)
            .collect();

        let table = self.dependency_table_mut()?;
        for name in &pinned {
            let Some(item) = table.get_mut(name) else {
                continue;
            };
            let mut entry = InlineTable::new();
            entry.insert("version", Value::from(format!("^{}", version)));
            if let Some(existing) = item.as_table_like() {
                for (key, value) in existing.iter() {
                    if key == "path" || key == "version" {
                        continue;
                    }
                    if let Some(value) = value.as_value() {
                        let mut value = value.clone();
                        value.decor_mut().clear();
                        entry.insert(key, value);
                    }
                }
            }
            replace_value(item, Value::InlineTable(entry));
        }

        Ok(pinned)
    }

    /// Renders the document, preserving all untouched formatting.
    pub fn to_toml_string(&self) -> String {
        self.doc.to_string()
    }

    /// Writes the document back to the path it was read from.
    pub fn write(&self) -> Result<()> {
        self.write_to(&self.path)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.to_toml_string())?;
        Ok(())
    }
}

fn replace_value(item: &mut Item, mut new: Value) {
    match item.as_value_mut() {
        Some(existing) => {
            let decor = existing.decor().clone();
            *new.decor_mut() = decor;
            *existing = new;
        }
        None => *item = Item::Value(new),
    }
}

/// Pins the path dependencies of the manifest at `manifest_path` to `version`.
///
/// Each referenced package whose own manifest exists gets its version set to
/// `version`; failures there are reported per package. The parent manifest is
/// rewritten afterwards so that its path entries become `^version` constraints.
///
/// # Errors
///
/// Returns an error if the parent manifest cannot be read or written.
pub fn pin_path_dependencies(
    manifest_path: &Path,
    version: &str,
    manifest_name: &str,
) -> Result<StageReport> {
    let mut manifest = Manifest::read(manifest_path)?;
    let mut report = StageReport::new();

    for dep in manifest.path_dependencies() {
        let dep_manifest_path = manifest.directory().join(&dep.path).join(manifest_name);
        let outcome = match Manifest::read(&dep_manifest_path) {
            Ok(mut dep_manifest) => match dep_manifest
                .set_version(version)
                .and_then(|_| dep_manifest.write())
            {
                Ok(()) => {
                    tracing::info!(
                        "[pyproject] Updated {} to version {}",
                        dep_manifest_path.display(),
                        version
                    );
                    ItemOutcome::succeeded(&dep_manifest_path)
                }
                Err(e) => ItemOutcome::failed(&dep_manifest_path, e.to_string()),
            },
            Err(e) => {
                tracing::error!("[pyproject] Error updating {}: {}", dep_manifest_path.display(), e);
                ItemOutcome::failed(&dep_manifest_path, e.to_string())
            }
        };
        report.push(outcome);
    }

    manifest.pin_path_dependencies(version)?;
    manifest.write()?;
    tracing::info!(
        "[pyproject] Updated dependency versions in {}",
        manifest_path.display()
    );
    report.push(ItemOutcome::succeeded(manifest_path));

    Ok(report)
}
