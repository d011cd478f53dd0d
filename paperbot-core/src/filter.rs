//! Turning raw feed items into candidates, and candidates into the set still to be posted.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::config::InvalidEntryPolicy;
use crate::contract::{PostRequest, RawEntry};
use crate::ledger::{Ledger, LedgerEntry, GUID_FORBIDDEN};
use crate::timestamp::{normalize, TimeParseError};

/// A feed item with a usable identity, not yet checked against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    pub guid: String,
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub link: String,
}

impl CandidateEntry {
    pub fn from_raw(raw: RawEntry) -> Result<Self, InvalidEntry> {
        if raw.guid.contains(GUID_FORBIDDEN) {
            return Err(InvalidEntry::Guid(raw.guid));
        }
        let published_at = normalize(&raw.published_raw)?;
        Ok(Self {
            guid: raw.guid,
            published_at,
            title: raw.title,
            link: raw.link,
        })
    }

    pub fn ledger_entry(&self) -> LedgerEntry {
        LedgerEntry::new(self.guid.clone(), self.published_at)
    }

    pub fn post_request(&self) -> PostRequest<'_> {
        PostRequest {
            title: &self.title,
            link: &self.link,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidEntry {
    #[error(transparent)]
    Timestamp(#[from] TimeParseError),

    #[error("guid {0:?} contains a tab or newline")]
    Guid(String),
}

/// A feed item left out of the run under [`InvalidEntryPolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub guid: String,
    pub title: String,
    pub reason: InvalidEntry,
}

#[derive(Debug, Default)]
pub struct Candidates {
    pub entries: Vec<CandidateEntry>,
    pub skipped: Vec<SkippedEntry>,
}

/// Normalize every raw item. Under `Abort` the first invalid item is returned as the error.
pub fn build_candidates(
    raw: Vec<RawEntry>,
    policy: InvalidEntryPolicy,
) -> Result<Candidates, InvalidEntry> {
    let mut out = Candidates::default();
    for item in raw {
        let guid = item.guid.clone();
        let title = item.title.clone();
        match CandidateEntry::from_raw(item) {
            Ok(candidate) => out.entries.push(candidate),
            Err(reason) => match policy {
                InvalidEntryPolicy::Abort => return Err(reason),
                InvalidEntryPolicy::Skip => {
                    warn!(guid = %guid, title = %title, error = %reason, "[SYNC] Skipping invalid feed entry");
                    out.skipped.push(SkippedEntry {
                        guid,
                        title,
                        reason,
                    });
                }
            },
        }
    }
    Ok(out)
}

/// Candidates whose key is not in `ledger`, in feed order.
///
/// A key repeated within the feed is kept only at its first occurrence.
pub fn filter_new(candidates: Vec<CandidateEntry>, ledger: &Ledger) -> Vec<CandidateEntry> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| {
            let key = c.ledger_entry();
            !ledger.contains(&key) && seen.insert(key)
        })
        .collect()
}
