//! RSS feed retrieval and parsing.
//!
//! [`HttpFeedSource`] is the production [`FeedSource`]: one GET against
//! `<base_url>/<subject>`, then [`parse_feed`] over the body. Only RSS 2.0
//! `<item>` children are read (`guid`, `pubDate`, `title`, `link`); anything
//! missing comes back as an empty string.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;

use crate::contract::{FeedError, FeedSource, RawEntry};

pub const DEFAULT_FEED_BASE_URL: &str = "https://rss.arxiv.org/rss";

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TOTAL_TIMEOUT_SECS: u64 = 30;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024;
const USER_AGENT: &str = concat!("paperbot/", env!("CARGO_PKG_VERSION"));

/// Feed source that downloads the subject's RSS feed over HTTP.
pub struct HttpFeedSource {
    client: Client,
    base_url: String,
}

impl HttpFeedSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FeedError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FeedError::Fetch(format!("failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn feed_url(&self, subject: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), subject)
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, subject: &str) -> Result<Vec<RawEntry>, FeedError> {
        let url = self.feed_url(subject);
        tracing::info!(url = %url, "Fetching feed");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Fetch(format!("HTTP {status} when fetching {url}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FeedError::Fetch(format!("failed to read response from {url}: {e}")))?;
        if bytes.len() > MAX_FEED_SIZE {
            return Err(FeedError::Fetch(format!(
                "feed too large: {} bytes (max {} bytes)",
                bytes.len(),
                MAX_FEED_SIZE
            )));
        }

        let entries = parse_feed(&bytes)?;
        tracing::info!(url = %url, entries = entries.len(), "Parsed feed");
        Ok(entries)
    }
}

#[derive(Clone, Copy)]
enum Field {
    Guid,
    Published,
    Title,
    Link,
}

impl Field {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"guid" => Some(Field::Guid),
            b"pubDate" => Some(Field::Published),
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            _ => None,
        }
    }
}

#[derive(Default)]
struct EntryBuilder {
    entry: RawEntry,
}

impl EntryBuilder {
    fn push_text(&mut self, field: Field, text: &str) {
        let slot = match field {
            Field::Guid => &mut self.entry.guid,
            Field::Published => &mut self.entry.published_raw,
            Field::Title => &mut self.entry.title,
            Field::Link => &mut self.entry.link,
        };
        slot.push_str(text);
    }

    fn build(mut self) -> RawEntry {
        self.entry.title = collapse_whitespace(&self.entry.title);
        self.entry.guid = self.entry.guid.trim().to_string();
        self.entry.link = self.entry.link.trim().to_string();
        self.entry
    }
}

/// Parse an RSS document into its items, in document order.
pub fn parse_feed(xml: &[u8]) -> Result<Vec<RawEntry>, FeedError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();

    let mut depth = 0usize;
    let mut saw_channel = false;
    let mut item: Option<(usize, EntryBuilder)> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = e.name();
                match (item_depth(&item), name.as_ref()) {
                    (_, b"channel") => saw_channel = true,
                    (None, b"item") => item = Some((depth, EntryBuilder::default())),
                    (Some(d), tag) if depth == d + 1 => field = Field::from_tag(tag),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                match item_depth(&item) {
                    Some(d) if depth == d => {
                        if let Some((_, builder)) = item.take() {
                            entries.push(builder.build());
                        }
                        field = None;
                    }
                    Some(d) if depth == d + 1 => field = None,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(e)) => {
                if let (Some((_, builder)), Some(f)) = (item.as_mut(), field) {
                    let text = e
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                    builder.push_text(f, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let (Some((_, builder)), Some(f)) = (item.as_mut(), field) {
                    builder.push_text(f, &String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FeedError::Parse(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(FeedError::Parse("unexpected end of document".to_string()));
    }
    if !saw_channel {
        return Err(FeedError::Parse("no RSS channel found".to_string()));
    }

    tracing::debug!(entries = entries.len(), "Parsed RSS items");
    Ok(entries)
}

fn item_depth(item: &Option<(usize, EntryBuilder)>) -> Option<usize> {
    item.as_ref().map(|(depth, _)| *depth)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
