//! Configuration for fetch operations.
//!
//! Values come from an optional TOML file and are then overridden by
//! command-line flags through the `with_*` setters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DriveError, Result};
use crate::mime_map::{ExportOverride, MimeMap};

/// What to do when a destination file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingFilePolicy {
    /// Download again and replace the file.
    #[default]
    Overwrite,
    /// Leave the file alone and report it as skipped.
    Skip,
}

/// Configuration for fetch operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Entries requested per listing page.
    pub page_size: u32,
    /// Deepest folder level whose children are listed; the root is level 0.
    pub max_depth: u32,
    /// Files downloaded concurrently within one folder.
    pub concurrency: usize,
    pub existing: ExistingFilePolicy,
    /// Retries for rate-limited or failed API requests.
    pub max_retries: u32,
    /// Where issued access tokens are cached between runs.
    pub token_cache: Option<PathBuf>,
    /// Export format overrides, keyed by Google-native mime type.
    pub export: BTreeMap<String, ExportOverride>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            max_depth: 1,
            concurrency: 4,
            existing: ExistingFilePolicy::Overwrite,
            max_retries: 3,
            token_cache: None,
            export: BTreeMap::new(),
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location, `<config dir>/drive_fetch/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("drive_fetch").join("config.toml"))
    }

    /// Default token cache location, `<cache dir>/drive_fetch/token.json`.
    pub fn default_token_cache() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("drive_fetch").join("token.json"))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| DriveError::Config(e.to_string()))?;
        config.validate()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| DriveError::filesystem(path, e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| DriveError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()
    }

    /// Load `path` if given (it must exist), otherwise the default location
    /// if a file exists there, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => {
                    log::debug!("Loading config from {}", path.display());
                    Self::load(&path)
                }
                None => Ok(Self::default()),
            },
        }
    }

    fn validate(self) -> Result<Self> {
        if self.page_size == 0 {
            return Err(DriveError::Config("page_size must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(DriveError::Config("concurrency must be at least 1".to_string()));
        }
        for (native, o) in &self.export {
            if let Some(ext) = o.extension.as_deref().filter(|e| e.contains(['/', '\\'])) {
                return Err(DriveError::Config(format!(
                    "export extension {:?} for {} contains a path separator",
                    ext, native
                )));
            }
        }
        Ok(self)
    }

    /// Build the export table: defaults plus this config's overrides.
    pub fn mime_map(&self) -> MimeMap {
        MimeMap::with_overrides(
            self.export
                .iter()
                .map(|(native, o)| (native.clone(), o.clone().into())),
        )
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_existing(mut self, existing: ExistingFilePolicy) -> Self {
        self.existing = existing;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_token_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_cache = Some(path.into());
        self
    }
}
