//! High-level pipeline: fetch → dedup against the ledger → publish → persist.
//!
//! This module orchestrates one run for one subject:
//!   - Fetches the subject's feed through a [`FeedSource`]
//!   - Normalizes entries into candidates, applying the configured [`InvalidEntryPolicy`]
//!   - Loads the ledger and keeps only candidates it has not seen
//!   - Publishes each new candidate in feed order through a [`Publisher`],
//!     pausing `post_delay` between calls
//!   - Records an entry in the ledger only once its post succeeded, then saves the ledger
//!
//! Each successful post prints `Posted to: <uri>` on stdout as soon as it is made,
//! so the line is there even if the run later stops.
//!
//! # Error Handling
//! Everything before the first publish is fail-fast and leaves the ledger file
//! untouched. Once publishing has started the ledger is always saved: a rejected
//! post is logged and retried on the next run, while an authentication failure
//! stops the loop and is returned after the save.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Supporting types: [`SyncReport`], [`SyncError`], [`exit_code`]

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{InvalidEntryPolicy, SyncConfig};
use crate::contract::{FeedError, FeedSource, PublishError, Publisher};
use crate::filter::{build_candidates, filter_new, InvalidEntry, SkippedEntry};
use crate::ledger::{Ledger, StorageError};

/// Outcome of a run that got as far as saving the ledger.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub subject: String,
    /// Items in the feed, valid or not.
    pub fetched: usize,
    /// Candidates not yet in the ledger.
    pub new: usize,
    pub published: Vec<PublishedEntry>,
    pub failed: Vec<FailedEntry>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone)]
pub struct PublishedEntry {
    pub guid: String,
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone)]
pub struct FailedEntry {
    pub guid: String,
    pub title: String,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("invalid feed entry: {0}")]
    InvalidEntry(#[from] InvalidEntry),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The ledger was saved before this was returned.
    #[error("publishing stopped after {published} post(s)")]
    Auth {
        published: usize,
        #[source]
        source: PublishError,
    },
}

/// Process exit status for a run: `0` on success, including runs where single posts failed.
pub fn exit_code(result: &Result<SyncReport, SyncError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

pub async fn synchronise<F, P>(
    subject: &str,
    config: &SyncConfig,
    feed: &F,
    publisher: &P,
) -> Result<SyncReport, SyncError>
where
    F: FeedSource + ?Sized,
    P: Publisher + ?Sized,
{
    info!(subject, "[SYNC] Starting synchronisation");

    // --- Step 1: Fetch ---
    let raw = match feed.fetch(subject).await {
        Ok(raw) => raw,
        Err(e) => {
            error!(subject, error = %e, "[SYNC][ERROR] Feed fetch failed");
            return Err(e.into());
        }
    };
    let fetched = raw.len();
    info!(subject, fetched, "[SYNC] Feed fetched");

    // --- Step 2: Normalize ---
    let candidates = match build_candidates(raw, config.on_invalid_entry) {
        Ok(c) => c,
        Err(e) => {
            error!(subject, error = %e, "[SYNC][ERROR] Invalid feed entry, aborting run");
            return Err(e.into());
        }
    };
    if config.on_invalid_entry == InvalidEntryPolicy::Skip && !candidates.skipped.is_empty() {
        warn!(
            skipped = candidates.skipped.len(),
            "[SYNC] Some feed entries were skipped"
        );
    }

    // --- Step 3: Dedup ---
    let mut ledger = match Ledger::load(&config.ledger_path) {
        Ok(ledger) => ledger,
        Err(e) => {
            error!(error = %e, "[SYNC][ERROR] Failed to load ledger");
            return Err(e.into());
        }
    };
    let fresh = filter_new(candidates.entries, &ledger);
    info!(
        known = ledger.len(),
        new = fresh.len(),
        "[SYNC] Filtered feed against ledger"
    );

    let mut report = SyncReport {
        subject: subject.to_string(),
        fetched,
        new: fresh.len(),
        skipped: candidates.skipped,
        ..SyncReport::default()
    };

    // --- Step 4: Publish ---
    let mut auth_failure = None;
    for (idx, candidate) in fresh.iter().enumerate() {
        if idx > 0 && !config.post_delay.is_zero() {
            tokio::time::sleep(config.post_delay).await;
        }

        match publisher.publish(candidate.post_request()).await {
            Ok(posted) => {
                info!(guid = %candidate.guid, uri = %posted.uri, "[SYNC][PUBLISH] Posted");
                println!("Posted to: {}", posted.uri);
                ledger.insert(candidate.ledger_entry());
                report.published.push(PublishedEntry {
                    guid: candidate.guid.clone(),
                    title: candidate.title.clone(),
                    uri: posted.uri,
                });
            }
            Err(e) if e.is_auth() => {
                error!(guid = %candidate.guid, error = %e, "[SYNC][ERROR][PUBLISH] Authentication failed, stopping");
                auth_failure = Some(e);
                break;
            }
            Err(e) => {
                error!(guid = %candidate.guid, error = %e, "[SYNC][ERROR][PUBLISH] Post rejected, will retry next run");
                report.failed.push(FailedEntry {
                    guid: candidate.guid.clone(),
                    title: candidate.title.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    // --- Step 5: Persist ---
    if let Err(e) = ledger.save(&config.ledger_path) {
        error!(error = %e, "[SYNC][ERROR] Failed to save ledger");
        return Err(e.into());
    }
    info!(
        entries = ledger.len(),
        published = report.published.len(),
        failed = report.failed.len(),
        "[SYNC] Ledger saved"
    );

    match auth_failure {
        Some(source) => Err(SyncError::Auth {
            published: report.published.len(),
            source,
        }),
        None => Ok(report),
    }
}
