//! # ledger: the persisted record of what has already been posted
//!
//! The ledger is a set of `(guid, published_at)` keys stored as a plain text
//! file, one `guid<TAB>timestamp` line per entry. It is loaded once at the start
//! of a run, grows in memory as posts succeed, and is rewritten in full at the
//! end of the run.
//!
//! ## File format
//! - UTF-8, `\n` line endings, blank lines ignored on load.
//! - Timestamps are written as RFC 3339 in UTC (`2024-01-01T00:00:00+00:00`).
//!   The space-separated form (`2024-01-01 00:00:00+00:00`) is accepted on load
//!   so that ledgers written by older versions keep working.
//! - Lines are sorted by guid, then by timestamp, so that successive ledgers
//!   diff cleanly.
//!
//! ## Durability
//! [`Ledger::save`] writes a temporary file next to the target and renames it
//! into place. A failed save leaves the previous ledger intact.
//! No locking is done: two concurrent runs against one file may lose updates.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Legacy timestamp layout: ISO-8601 with a space separator.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// Characters that would break the line/column layout.
pub const GUID_FORBIDDEN: &[char] = &['\t', '\n', '\r'];

/// Identity of a published entry. Ordering is by guid, then publication time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerEntry {
    pub guid: String,
    pub published_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(guid: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            guid: guid.into(),
            published_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt ledger {path} at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("guid {guid:?} cannot be stored in the ledger: it contains a tab or newline")]
    UnrepresentableGuid { guid: String },
}

/// In-memory ledger. Iteration order is the on-disk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: BTreeSet<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the ledger at `path`. A missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No ledger file found, starting with an empty ledger");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(StorageError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut entries = BTreeSet::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let corrupt = |reason: String| StorageError::Corrupt {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            };
            let (guid, stamp) = line
                .split_once('\t')
                .ok_or_else(|| corrupt("expected guid<TAB>timestamp".to_string()))?;
            let published_at = parse_stored_timestamp(stamp.trim_end_matches('\r'))
                .ok_or_else(|| corrupt(format!("invalid timestamp {stamp:?}")))?;
            entries.insert(LedgerEntry::new(guid, published_at));
        }

        info!(path = %path.display(), entries = entries.len(), "Loaded ledger");
        Ok(Self { entries })
    }

    /// Rewrite the ledger at `path` with every entry, sorted.
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let mut out = String::new();
        for entry in &self.entries {
            if entry.guid.contains(GUID_FORBIDDEN) {
                return Err(StorageError::UnrepresentableGuid {
                    guid: entry.guid.clone(),
                });
            }
            out.push_str(&entry.guid);
            out.push('\t');
            out.push_str(&format_timestamp(&entry.published_at));
            out.push('\n');
        }

        let write_err = |source: io::Error| StorageError::Write {
            path: path.to_path_buf(),
            source,
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(out.as_bytes()).map_err(write_err)?;
        // temp files are created 0600; keep the mode of the ledger being replaced
        if let Ok(existing) = fs::metadata(path) {
            if existing.is_file() {
                tmp.as_file()
                    .set_permissions(existing.permissions())
                    .map_err(write_err)?;
            }
        }
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;

        debug!(path = %path.display(), entries = self.entries.len(), "Saved ledger");
        Ok(())
    }

    pub fn contains(&self, entry: &LedgerEntry) -> bool {
        self.entries.contains(entry)
    }

    /// Returns `false` if the entry was already present.
    pub fn insert(&mut self, entry: LedgerEntry) -> bool {
        self.entries.insert(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }
}

impl FromIterator<LedgerEntry> for Ledger {
    fn from_iter<I: IntoIterator<Item = LedgerEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

fn parse_stored_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::<FixedOffset>::parse_from_str(raw, LEGACY_TIMESTAMP_FORMAT))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
