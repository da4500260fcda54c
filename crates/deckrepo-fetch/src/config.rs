//! Engine configuration, resolved once at startup and passed into the
//! fetcher, orchestrator, and installer as an explicit value.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::FetchError;

/// Remote catalog service used when no override is configured.
pub const DEFAULT_BASE_URL: &str = "https://steamdeckrepo.com";

/// Override directory consumed by the Steam client on a real Deck.
const DECK_OVERRIDE_DIR: &str = "/home/deck/.steam/root/config/uioverrides/movies";

/// Directory name used under the platform cache/config dirs.
const APP_DIR: &str = "deckrepo-manager";

/// Runtime configuration for the acquisition engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the catalog service.
    pub base_url: String,

    /// Directory that receives installed videos (the playback override dir).
    pub install_root: PathBuf,

    /// File holding the last successful catalog response, verbatim.
    pub cache_file: PathBuf,

    /// Bound on catalog and connect calls.
    pub request_timeout: Duration,
}

impl Config {
    /// Build a [`Config`] from the persisted config file, environment
    /// overrides, and platform defaults.
    pub fn from_env() -> Self {
        Self {
            base_url: env_or("DECKREPO_BASE_URL", DEFAULT_BASE_URL),
            install_root: resolve_install_root(),
            cache_file: default_cache_file(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Resolve the install root: persisted choice, then `DECKREPO_INSTALL_PATH`,
/// then the Steam Deck override directory when it looks like a real Deck,
/// then a generic documents fallback.
pub fn resolve_install_root() -> PathBuf {
    resolve_install_root_from(
        ConfigFile::load(),
        env::var("DECKREPO_INSTALL_PATH").ok(),
    )
}

fn resolve_install_root_from(file: ConfigFile, env_override: Option<String>) -> PathBuf {
    if !file.install_path.is_empty() {
        return PathBuf::from(file.install_path);
    }
    if let Some(path) = env_override {
        return PathBuf::from(path);
    }
    default_install_root()
}

fn default_install_root() -> PathBuf {
    let deck_path = Path::new(DECK_OVERRIDE_DIR);
    // Only trust the Deck path when its config/uioverrides parent exists.
    if cfg!(target_os = "linux") {
        if let Some(parent) = deck_path.parent() {
            if parent.exists() {
                return deck_path.to_path_buf();
            }
        }
    }

    dirs_next::document_dir()
        .unwrap_or_else(env::temp_dir)
        .join("DeckRepoManager")
        .join("movies")
}

fn default_cache_file() -> PathBuf {
    dirs_next::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR)
        .join("posts.json")
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// User settings persisted as JSON under the platform config directory.
///
/// Only the install path is stored today. A corrupt file is replaced with
/// defaults rather than surfaced as an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub install_path: String,
}

impl ConfigFile {
    /// Location of the persisted config file.
    pub fn path() -> PathBuf {
        dirs_next::config_dir()
            .unwrap_or_else(env::temp_dir)
            .join(APP_DIR)
            .join("config.json")
    }

    /// Load the persisted settings, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config file is corrupt; using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist the settings, creating the config directory as needed.
    pub fn save(&self) -> Result<(), FetchError> {
        self.save_to(&Self::path())
    }

    fn save_to(&self, path: &Path) -> Result<(), FetchError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}
