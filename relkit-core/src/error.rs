//! Error types and result aliases.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Directory not found: {0}")]
    NotADirectory(PathBuf),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Could not parse TOML from {path}: {message}")]
    ManifestParse { path: PathBuf, message: String },

    #[error("Invalid structure in {path}: {message}")]
    ManifestStructure { path: PathBuf, message: String },

    #[error("Invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    #[error("Target version {target} is lower than current version {current}; versions cannot move downwards")]
    DowngradeRejected { current: String, target: String },

    #[error("Version {0} is already final; nothing to finalize")]
    NotInDevelopment(String),

    #[error("Invalid threshold format '{threshold}': {message}. Expected '<op>:<number>' with op one of gt, ge, lt, le, eq")]
    InvalidThreshold { threshold: String, message: String },

    #[error("Invalid test report {path}: {message}")]
    InvalidReport { path: PathBuf, message: String },

    #[error("Command '{command}' failed in {cwd}: {message}")]
    CommandFailed {
        command: String,
        cwd: PathBuf,
        message: String,
    },

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Pipeline cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Config error in {path}: {message}")]
    Config { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
