/// `load_config` module: loads the optional YAML settings file and folds in command-line overrides.
///
/// Settings come from three layers, later ones winning:
/// 1. built-in defaults ([`Settings::default`])
/// 2. the YAML file given with `--config`, if any
/// 3. command-line flags (see [`Settings::apply_overrides`])
///
/// Credentials are never read from the file; they come from the environment
/// (see [`crate::publish`]).
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced at the CLI boundary.
use anyhow::Result;
use paperbot_core::config::{
    InvalidEntryPolicy, SyncConfig, DEFAULT_LEDGER_PATH, DEFAULT_POST_DELAY,
};
use paperbot_core::feed::DEFAULT_FEED_BASE_URL;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use crate::publish::DEFAULT_SERVICE;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub ledger_path: PathBuf,
    pub feed_base_url: String,
    pub post_delay_secs: u64,
    pub on_invalid_entry: InvalidEntryPolicy,
    pub bluesky_service: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            post_delay_secs: DEFAULT_POST_DELAY.as_secs(),
            on_invalid_entry: InvalidEntryPolicy::default(),
            bluesky_service: DEFAULT_SERVICE.to_string(),
        }
    }
}

impl Settings {
    pub fn apply_overrides(&mut self, ledger: Option<PathBuf>, delay_secs: Option<u64>) {
        if let Some(ledger) = ledger {
            self.ledger_path = ledger;
        }
        if let Some(delay) = delay_secs {
            self.post_delay_secs = delay;
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            ledger_path: self.ledger_path.clone(),
            post_delay: Duration::from_secs(self.post_delay_secs),
            on_invalid_entry: self.on_invalid_entry,
        }
    }
}

/// Loads a YAML settings file. Keys left out keep their defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let settings: Settings = match serde_yaml::from_str(&config_content) {
        Ok(settings) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            settings
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    Ok(settings)
}

/// Defaults, or the file at `path` when given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => load_config(path),
        None => Ok(Settings::default()),
    }
}
