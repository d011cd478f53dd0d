//! # contract: interfaces to the feed and the posting service
//!
//! The sync pipeline talks to the outside world through two traits:
//! - [`FeedSource`] yields the raw entries of a subject's feed.
//! - [`Publisher`] submits a single announcement and reports where it landed.
//!
//! Both are annotated for `mockall`, so tests can script the external side of a
//! run without network access. Real implementations live in [`crate::feed`]
//! (RSS over HTTP) and in the CLI crate (Bluesky).

use async_trait::async_trait;
use thiserror::Error;

use mockall::automock;

/// A feed item as delivered by the feed source.
///
/// Fields missing from the feed are empty strings, never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub guid: String,
    /// Publication time in the feed's own textual form (RFC 2822 for RSS).
    pub published_raw: String,
    pub title: String,
    pub link: String,
}

/// The text handed to the publisher for one announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostRequest<'a> {
    pub title: &'a str,
    pub link: &'a str,
}

/// Where a successful post ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResult {
    pub uri: String,
}

#[derive(Debug, Error)]
pub enum FeedError {
    /// Network failure or non-success HTTP status.
    #[error("failed to fetch feed: {0}")]
    Fetch(String),

    /// The body was not a well-formed RSS document.
    #[error("failed to parse feed: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    /// Credentials rejected or session expired. Retrying the next entry would fail the same way.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The service rejected this particular post, or the request did not go through.
    #[error("post submission failed: {0}")]
    Submit(String),
}

impl PublishError {
    pub fn is_auth(&self) -> bool {
        matches!(self, PublishError::Auth(_))
    }
}

/// Source of feed entries for a subject.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch and parse the feed for `subject`, returning its items in feed order.
    async fn fetch(&self, subject: &str) -> Result<Vec<RawEntry>, FeedError>;
}

/// Posting service for announcements.
///
/// Implementors own their session: it is acquired once and reused for every
/// call in a run. The caller is responsible for spacing calls out.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Submit one post.
    async fn publish<'a>(&self, req: PostRequest<'a>) -> Result<PostResult, PublishError>;
}
