//! Tool settings loaded from `relkit.toml`.
//!
//! Lookup order: the nearest `relkit.toml` walking up from the starting
//! directory (stopping at the repository root, marked by `.git`), then the
//! user-level `relkit/config.toml` in the platform config directory, then
//! built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command_validator::DEFAULT_SECRET_PREFIXES;
use crate::error::{Error, Result};
use crate::manifest::DEFAULT_MANIFEST_NAME;
use crate::remote::DEFAULT_RAW_CONTENT_BASE;

pub const CONFIG_FILE_NAME: &str = "relkit.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// File name of package manifests.
    pub manifest_name: String,
    /// Package manager executable.
    pub package_tool: String,
    /// Linter/formatter executable.
    pub lint_tool: String,
    /// Git executable.
    pub git: String,
    pub raw_content_base: String,
    pub remote: String,
    /// Parent directory for dependency clones; the system temp dir if unset.
    pub clone_dir: Option<PathBuf>,
    pub secret_prefixes: Vec<String>,
    /// Remote manifest fetch timeout; no timeout if unset.
    pub fetch_timeout_secs: Option<u64>,
    /// Print command output live instead of only capturing it.
    pub stream_output: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            package_tool: "poetry".to_string(),
            lint_tool: "ruff".to_string(),
            git: "git".to_string(),
            raw_content_base: DEFAULT_RAW_CONTENT_BASE.to_string(),
            remote: "origin".to_string(),
            clone_dir: None,
            secret_prefixes: DEFAULT_SECRET_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            fetch_timeout_secs: None,
            stream_output: false,
        }
    }
}

impl Settings {
    /// Loads settings for work rooted at `start_dir`.
    pub fn load(start_dir: &Path) -> Result<Self> {
        if let Some(path) = Self::find_workspace_config(start_dir) {
            tracing::debug!("[config] Using {}", path.display());
            return Self::from_file(&path);
        }

        if let Some(path) = Self::global_config_path().filter(|p| p.is_file()) {
            tracing::debug!("[config] Using {}", path.display());
            return Self::from_file(&path);
        }

        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Nearest `relkit.toml` at or above `start_dir`, not looking past the repository root.
    pub fn find_workspace_config(start_dir: &Path) -> Option<PathBuf> {
        let mut current_dir = start_dir;

        loop {
            let candidate = current_dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }

            if current_dir.join(".git").exists() {
                return None;
            }

            match current_dir.parent() {
                Some(parent) if parent != current_dir => current_dir = parent,
                _ => return None,
            }
        }
    }

    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("relkit").join("config.toml"))
    }

    pub fn clone_parent(&self) -> PathBuf {
        self.clone_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }
}
