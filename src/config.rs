// Persisted configuration
//
// Lives in `<config dir>/quick-dl/config.json`. On first start a default
// file is written so there is something to edit; an existing file is never
// overwritten. Missing keys take their defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::downloader::models::{
    DestinationCandidate, DestinationCatalog, OverrideTable, SourceOverride,
};

const APP_DIR: &str = "quick-dl";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9778;
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the user config directory")]
    NoConfigDir,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode default config: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One entry of `paths`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathEntry {
    pub name: String,
    pub path: String,
    pub keywords: Vec<String>,
}

/// One entry of `urls`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlEntry {
    pub url: String,
    pub cookies: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Pass --quiet to yt-dlp
    pub quiet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ytdlp_path: Option<String>,
    /// Install yt-dlp at startup when it cannot be found
    pub auto_install: bool,
    /// Let probed tags count towards destination ranking
    pub score_tags: bool,
    pub queue_capacity: usize,
    /// Kill yt-dlp after this many seconds; unset means wait forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    pub paths: Vec<PathEntry>,
    pub urls: Vec<UrlEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let folder = |name: &str| home.join(name).to_string_lossy().into_owned();

        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            quiet: false,
            ytdlp_path: None,
            auto_install: true,
            score_tags: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            command_timeout_secs: None,
            paths: vec![
                PathEntry {
                    name: "Downloads".to_string(),
                    path: folder("Downloads"),
                    keywords: vec![],
                },
                PathEntry {
                    name: "Music".to_string(),
                    path: folder("Music"),
                    keywords: vec!["music".into(), "song".into(), "album".into()],
                },
                PathEntry {
                    name: "Videos".to_string(),
                    path: folder("Videos"),
                    keywords: vec!["video".into(), "movie".into(), "film".into()],
                },
            ],
            urls: vec![],
        }
    }
}

impl AppConfig {
    /// `<config dir>/quick-dl/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Read `path`, writing the defaults there first if it does not exist
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::default().write_new(path)?;
            info!(path = %path.display(), "Wrote default config");
        }

        let raw = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write via a sibling temp file, renamed into place once complete
    fn write_new(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;
        }

        let encoded = serde_json::to_string_pretty(self).map_err(ConfigError::Encode)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, encoded).map_err(|source| io_error(&temp_path, source))?;

        if let Err(source) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_error(path, source));
        }
        Ok(())
    }

    /// Destinations with ids assigned in file order
    pub fn catalog(&self) -> DestinationCatalog {
        DestinationCatalog::new(
            self.paths
                .iter()
                .enumerate()
                .map(|(id, entry)| {
                    DestinationCandidate::new(
                        id.to_string(),
                        entry.name.clone(),
                        entry.path.clone(),
                        &entry.keywords,
                    )
                })
                .collect(),
        )
    }

    pub fn override_table(&self) -> OverrideTable {
        OverrideTable::new(
            self.urls
                .iter()
                .map(|entry| {
                    SourceOverride::new(
                        entry.url.clone(),
                        Some(entry.cookies.clone()),
                        Some(entry.format.clone()),
                    )
                })
                .collect(),
        )
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}
