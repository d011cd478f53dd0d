//! Normalization of feed publication dates to UTC.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unparseable publication date {raw:?}")]
pub struct TimeParseError {
    pub raw: String,
}

/// Parse an RFC 2822 date as found in RSS `pubDate` and convert it to UTC.
///
/// A date without a zone is taken to be UTC, as is the "unknown zone" marker `-0000`.
pub fn normalize(published_raw: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let trimmed = published_raw.trim();
    if trimmed.is_empty() {
        return Err(TimeParseError {
            raw: published_raw.to_string(),
        });
    }

    DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_rfc2822(&format!("{trimmed} +0000")))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            tracing::debug!(raw = %published_raw, error = %e, "Failed to parse publication date");
            TimeParseError {
                raw: published_raw.to_string(),
            }
        })
}
