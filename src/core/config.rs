//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Engine behavior that is policy rather than semantics lives here:
//! the default branch name and whether merges may fast-forward. Config
//! is loaded from a TOML file when one exists; missing files are not an
//! error and fall back to defaults.
//!
//! # Example
//!
//! ```toml
//! default_branch = "main"
//!
//! [merge]
//! fast_forward = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::BranchName;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Merge policy settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Whether a merge may fast-forward when ours is an ancestor of
    /// theirs. Defaults to true.
    pub fast_forward: Option<bool>,
}

/// Engine configuration.
///
/// Accessor methods apply defaults, so callers never see `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Branch created for a fresh session. Defaults to "main".
    pub default_branch: Option<String>,

    /// Merge policy.
    pub merge: Option<MergeConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or
    /// parsed, or if a value fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(branch) = &self.default_branch {
            BranchName::new(branch.clone())
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        }
        Ok(())
    }

    /// The default branch name, with the fallback applied.
    pub fn default_branch(&self) -> BranchName {
        self.default_branch
            .as_deref()
            .and_then(|name| BranchName::new(name).ok())
            .unwrap_or_else(|| BranchName::new("main").expect("static branch name is valid"))
    }

    /// Whether fast-forward merges are allowed.
    pub fn fast_forward(&self) -> bool {
        self.merge
            .as_ref()
            .and_then(|m| m.fast_forward)
            .unwrap_or(true)
    }
}
