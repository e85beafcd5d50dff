// src/config.rs
// =============================================================================
// This module loads the run configuration.
//
// Sources, lowest priority first:
// 1. Built-in defaults
// 2. The JSON config file (created with the defaults if it doesn't exist)
// 3. Command-line flags
//
// Problems here (unreadable file, bad JSON, zero concurrency, a downloads
// directory we can't create) are the only fatal errors of a run, so they
// are anyhow errors with context naming the path involved.
// =============================================================================

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

const DEFAULT_URL: &str = "http://blog.livedoor.jp/daibakarenji/infoinfo.html";
const DEFAULT_DOWNLOADS_DIR: &str = "Downloads";
const DEFAULT_CONCURRENCY: usize = 5;
const DEFAULT_MAX_DEPTH: usize = 2;

/// Contents of config.json.
///
/// The concurrency key is spelled `goroutines` so existing config files keep
/// working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    pub url: String,
    pub downloads_directory: PathBuf,
    #[serde(rename = "goroutines")]
    pub concurrency: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            downloads_directory: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            concurrency: DEFAULT_CONCURRENCY,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ConfigFile {
    /// Reads the config file, writing the defaults to it first if it's missing.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("{} doesn't exist, creating it with defaults", path.display());
            let config = Self::default();
            config.save_to_file(path)?;
            return Ok(config);
        }

        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))
    }

    fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))
    }

    /// Applies command-line overrides and validates the result.
    pub fn resolve(self, overrides: Overrides) -> Result<Settings> {
        let settings = Settings {
            url: overrides.url.unwrap_or(self.url),
            downloads_dir: overrides.downloads_dir.unwrap_or(self.downloads_directory),
            concurrency: overrides.concurrency.unwrap_or(self.concurrency),
            max_depth: overrides.max_depth.unwrap_or(self.max_depth),
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Values given on the command line; `None` means "use the file".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub downloads_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub max_depth: Option<usize>,
}

/// The effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub url: String,
    pub downloads_dir: PathBuf,
    pub concurrency: usize,
    pub max_depth: usize,
}

impl Settings {
    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url).with_context(|| format!("Invalid seed URL '{}'", self.url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            bail!("Seed URL must be http or https: {}", self.url);
        }
        if self.concurrency == 0 {
            bail!("Concurrency (goroutines) must be greater than zero");
        }
        Ok(())
    }

    /// Creates the downloads directory (and parents) if needed.
    pub fn prepare_downloads_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.downloads_dir).with_context(|| {
            format!("Failed to create downloads directory: {}", self.downloads_dir.display())
        })?;
        debug!("Loaded directory {}", self.downloads_dir.display());
        Ok(())
    }
}
