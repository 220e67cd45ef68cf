//! Rewriting git dependencies into version constraints from their remote manifests.

use std::fs;
use std::path::Path;
use std::time::Duration;

use toml_edit::{InlineTable, Value};

use crate::error::{Error, Result};
use crate::manifest::{Manifest, DEFAULT_MANIFEST_NAME};
use crate::outcome::{ItemOutcome, StageReport};
use crate::pipeline::Stage;
use crate::reporter::PipelineReporter;
use crate::targets::TargetSpec;

/// Base URL serving raw repository files.
pub const DEFAULT_RAW_CONTENT_BASE: &str = "https://raw.githubusercontent.com";

/// Retrieves the text of a remote file.
pub trait ManifestFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String>;
}

/// [`ManifestFetcher`] doing unauthenticated HTTP GET requests.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Builds a fetcher; `timeout` of `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("relkit/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Fetch {
                url: String::new(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

impl ManifestFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let fetch_error = |e: reqwest::Error| Error::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        self.client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(fetch_error)
    }
}

/// Raw-content URL of the manifest of a GitHub-hosted repository.
///
/// Returns `None` for any URL not hosted on GitHub. Both
/// `https://github.com/owner/repo(.git)` and `git@github.com:owner/repo(.git)`
/// forms are understood.
pub fn raw_manifest_url(
    git_url: &str,
    branch: &str,
    subdirectory: &str,
    raw_content_base: &str,
    manifest_name: &str,
) -> Option<String> {
    let (_, repo) = git_url
        .rsplit_once("github.com/")
        .or_else(|| git_url.rsplit_once("github.com:"))?;
    let repo = repo.trim_end_matches('/');
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if repo.is_empty() {
        return None;
    }

    let mut url = format!(
        "{}/{}/{}/",
        raw_content_base.trim_end_matches('/'),
        repo,
        branch
    );
    let subdirectory = subdirectory.trim_matches('/');
    if !subdirectory.is_empty() {
        url.push_str(subdirectory);
        url.push('/');
    }
    url.push_str(manifest_name);
    Some(url)
}

pub struct RemoteVersionResolver<'a> {
    fetcher: &'a dyn ManifestFetcher,
    raw_content_base: String,
    manifest_name: String,
}

impl<'a> RemoteVersionResolver<'a> {
    pub fn new(fetcher: &'a dyn ManifestFetcher) -> Self {
        Self {
            fetcher,
            raw_content_base: DEFAULT_RAW_CONTENT_BASE.to_string(),
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
        }
    }

    pub fn with_raw_content_base(mut self, base: impl Into<String>) -> Self {
        self.raw_content_base = base.into();
        self
    }

    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    /// Version declared by the remote manifest at `branch`/`subdirectory`.
    ///
    /// Any failure (unsupported host, HTTP error, unparsable document, missing
    /// version) yields `None`.
    pub fn fetch_version(&self, git_url: &str, branch: &str, subdirectory: &str) -> Option<String> {
        let Some(url) = raw_manifest_url(
            git_url,
            branch,
            subdirectory,
            &self.raw_content_base,
            &self.manifest_name,
        ) else {
            tracing::warn!("[remote] Currently only supports GitHub: {}", git_url);
            return None;
        };

        tracing::info!("[remote] Fetching remote manifest from {}", url);
        let content = match self.fetcher.fetch(&url) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("[remote] {}", e);
                return None;
            }
        };

        let manifest = match Manifest::parse_str(&content, url.as_str()) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("[remote] {}", e);
                return None;
            }
        };

        match manifest.version().filter(|v| !v.trim().is_empty()) {
            Some(version) => Some(version),
            None => {
                tracing::warn!("[remote] No version found in remote manifest at {}", url);
                None
            }
        }
    }

    /// Applies remote versions to every git dependency of `manifest`.
    ///
    /// Returns the number of dependencies turned into version constraints.
    pub fn apply(&self, manifest: &mut Manifest) -> Result<usize> {
        let extras = manifest.extras();
        let in_extras = |name: &str| {
            extras
                .as_ref()
                .map_or(false, |groups| groups.values().flatten().any(|member| member == name))
        };

        let mut rewritten = 0;
        for dep in manifest.git_dependencies() {
            tracing::info!(
                "[remote] Checking git dependency '{}' -> {}@{} subdirectory='{}'",
                dep.name,
                dep.url,
                dep.branch,
                dep.subdirectory
            );
            let originally_optional = dep.optional || in_extras(&dep.name);

            match self.fetch_version(&dep.url, &dep.branch, &dep.subdirectory) {
                Some(version) => {
                    tracing::info!("[remote] '{}' resolved to {}", dep.name, version);
                    manifest.replace_dependency(&dep.name, constraint(&version, originally_optional))?;
                    rewritten += 1;
                }
                None => {
                    tracing::warn!(
                        "[remote] Could not get remote version for '{}'; keeping git source",
                        dep.name
                    );
                    manifest.set_dependency_optional(&dep.name, originally_optional)?;
                }
            }
        }

        if extras.is_some() {
            manifest.prune_extras()?;
        }

        Ok(rewritten)
    }

    /// Rewrites the manifest at `path` in place.
    pub fn rewrite(&self, path: &Path) -> ItemOutcome {
        self.rewrite_to(path, None)
    }

    /// Rewrites the manifest at `path`, writing the result to `output` if given.
    ///
    /// Never fails: read, parse and write problems are reported in the outcome.
    /// A manifest that needs no change is not rewritten in place.
    pub fn rewrite_to(&self, path: &Path, output: Option<&Path>) -> ItemOutcome {
        match self.try_rewrite(path, output) {
            Ok(()) => ItemOutcome::succeeded(path),
            Err(e) => {
                tracing::error!("[remote] Error updating {}: {}", path.display(), e);
                ItemOutcome::failed(path, e.to_string())
            }
        }
    }

    fn try_rewrite(&self, path: &Path, output: Option<&Path>) -> Result<()> {
        let original = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ManifestNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut manifest = Manifest::parse_str(&original, path)?;
        manifest.validate_structure()?;

        self.apply(&mut manifest)?;
        let updated = manifest.to_toml_string();

        match output {
            Some(output) => {
                manifest.write_to(output)?;
                tracing::info!("[remote] Updated file written to {}", output.display());
            }
            None if updated != original => {
                manifest.write()?;
                tracing::info!("[remote] Updated file written to {}", path.display());
            }
            None => tracing::info!("[remote] No updates applied in {}", path.display()),
        }
        Ok(())
    }

    /// Rewrites every manifest `targets` resolves to.
    ///
    /// `output` is honoured only when exactly one manifest resolved; otherwise
    /// every manifest is rewritten in place.
    ///
    /// # Errors
    ///
    /// Only target discovery is fatal; per-file failures are recorded in the report.
    pub fn rewrite_bulk(
        &self,
        targets: &TargetSpec,
        output: Option<&Path>,
        reporter: &dyn PipelineReporter,
    ) -> Result<StageReport> {
        let manifests = targets.resolve(&self.manifest_name)?;
        let output = match output {
            Some(_) if manifests.len() > 1 => {
                let message = "Multiple manifests found but a single output was provided; updating each file in place";
                tracing::warn!("[remote] {}", message);
                reporter.warning(Stage::RemoteUpdate, message);
                None
            }
            other => other,
        };

        let total = manifests.len();
        let mut report = StageReport::new();
        for (index, path) in manifests.iter().enumerate() {
            tracing::info!(
                "[remote] ({}/{}) Updating remote dependencies in {}",
                index + 1,
                total,
                path.display()
            );
            reporter.item_started(Stage::RemoteUpdate, index + 1, total, path);
            let outcome = self.rewrite_to(path, output);
            reporter.item_finished(Stage::RemoteUpdate, &outcome);
            report.push(outcome);
        }

        if report.success {
            tracing::info!("[remote] Remote update completed successfully for all files");
        } else {
            tracing::error!("[remote] Some updates failed");
        }
        Ok(report)
    }
}

fn constraint(version: &str, optional: bool) -> InlineTable {
    let mut entry = InlineTable::new();
    entry.insert("version", Value::from(format!("^{}", version)));
    if optional {
        entry.insert("optional", Value::from(true));
    }
    entry
}
