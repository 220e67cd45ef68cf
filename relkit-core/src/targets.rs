//! Resolution of the manifests an operation applies to.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::manifest::DEFAULT_MANIFEST_NAME;

/// Which manifests to operate on: one file, or a directory optionally walked recursively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSpec {
    pub file: Option<PathBuf>,
    pub directory: Option<PathBuf>,
    pub recursive: bool,
}

impl TargetSpec {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn directory(path: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            file: None,
            directory: Some(path.into()),
            recursive,
        }
    }

    pub fn resolve(&self, manifest_name: &str) -> Result<Vec<PathBuf>> {
        TargetResolver::new(manifest_name).resolve(
            self.file.as_deref(),
            self.directory.as_deref(),
            self.recursive,
        )
    }

    /// Directory commands run in: the given directory, or the file's parent.
    pub fn working_directory(&self) -> Option<PathBuf> {
        self.directory.clone().or_else(|| {
            self.file
                .as_ref()
                .and_then(|f| f.parent())
                .map(|p| {
                    if p.as_os_str().is_empty() {
                        PathBuf::from(".")
                    } else {
                        p.to_path_buf()
                    }
                })
        })
    }
}

/// Finds manifests by explicit file or by directory search.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    manifest_name: String,
}

impl Default for TargetResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST_NAME)
    }
}

impl TargetResolver {
    pub fn new(manifest_name: impl Into<String>) -> Self {
        Self {
            manifest_name: manifest_name.into(),
        }
    }

    /// Resolves targets to absolute manifest paths.
    ///
    /// An explicit `file` wins over `directory`. A recursive search returns
    /// every manifest under `directory`, ordered by path.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] if the file or a manifest in the directory is missing
    /// * [`Error::NotADirectory`] if `directory` is not a directory
    /// * [`Error::InvalidArguments`] if neither `file` nor `directory` is given
    pub fn resolve(
        &self,
        file: Option<&Path>,
        directory: Option<&Path>,
        recursive: bool,
    ) -> Result<Vec<PathBuf>> {
        if let Some(file) = file {
            let path = absolutize(file)?;
            if !path.is_file() {
                return Err(Error::NotFound(format!("File not found: {}", path.display())));
            }
            return Ok(vec![path]);
        }

        let Some(directory) = directory else {
            return Err(Error::InvalidArguments(
                "Must provide either a file or a directory".to_string(),
            ));
        };

        let dir = absolutize(directory)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(dir));
        }

        if !recursive {
            let single = dir.join(&self.manifest_name);
            if !single.is_file() {
                return Err(Error::NotFound(format!(
                    "No {} in {}",
                    self.manifest_name,
                    dir.display()
                )));
            }
            return Ok(vec![single]);
        }

        let matched: Vec<PathBuf> = WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_file() && entry.file_name() == self.manifest_name.as_str()
            })
            .map(|entry| entry.into_path())
            .collect();

        if matched.is_empty() {
            return Err(Error::NotFound(format!(
                "No {} found recursively in {}",
                self.manifest_name,
                dir.display()
            )));
        }

        tracing::debug!(
            "[targets] Found {} manifest(s) under {}",
            matched.len(),
            dir.display()
        );
        Ok(matched)
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(joined
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect())
}
