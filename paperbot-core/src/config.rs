use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_LEDGER_PATH: &str = "pubdb.txt";
pub const DEFAULT_POST_DELAY: Duration = Duration::from_secs(2);

/// What to do with a feed entry whose guid or publication date cannot be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidEntryPolicy {
    /// Stop the run before anything is published.
    #[default]
    Abort,
    /// Log the entry and carry on without it.
    Skip,
}

/// Settings for one synchronisation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub ledger_path: PathBuf,
    /// Minimum pause between the end of one publish call and the start of the next.
    pub post_delay: Duration,
    pub on_invalid_entry: InvalidEntryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            post_delay: DEFAULT_POST_DELAY,
            on_invalid_entry: InvalidEntryPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn trace_loaded(&self) {
        info!(
            ledger_path = %self.ledger_path.display(),
            post_delay_ms = self.post_delay.as_millis() as u64,
            on_invalid_entry = ?self.on_invalid_entry,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}
