#![doc = "Publisher integration for the CLI: implements the core `Publisher` trait against the Bluesky XRPC API."]
//
//! # Bluesky publisher
//!
//! [`BlueskyClient`] posts announcements to a Bluesky account.
//!
//! - Construct it with [`BlueskyClient::new_from_env`], which reads `BSKY_HANDLE`
//!   and `BSKY_PASS`. Missing variables are an error before any network I/O.
//! - The session (`com.atproto.server.createSession`) is created on the first
//!   publish and reused for the rest of the run.
//! - Each post is an `app.bsky.feed.post` record whose text is the title and the
//!   link on two lines, with a link facet so the URL is clickable.
//!
//! Rejections caused by credentials or an expired session are reported as
//! [`PublishError::Auth`]; every other failure is [`PublishError::Submit`].

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use paperbot_core::contract::{PostRequest, PostResult, PublishError, Publisher};

pub const DEFAULT_SERVICE: &str = "https://bsky.social";
pub const HANDLE_ENV: &str = "BSKY_HANDLE";
pub const PASSWORD_ENV: &str = "BSKY_PASS";

/// Bluesky's limit on post length, in characters.
const MAX_POST_CHARS: usize = 300;
const TIMEOUT_SECS: u64 = 30;

/// XRPC error names that mean the credentials or session are no good.
const AUTH_ERRORS: &[&str] = &[
    "AuthenticationRequired",
    "AuthFactorTokenRequired",
    "AccountTakedown",
    "ExpiredToken",
    "InvalidToken",
];

#[derive(Debug, Deserialize)]
struct Session {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
    did: String,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    uri: String,
}

#[derive(Debug, Default, Deserialize)]
struct XrpcError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

pub struct BlueskyClient {
    http: Client,
    service: String,
    identifier: String,
    password: String,
    session: OnceCell<Session>,
}

impl BlueskyClient {
    pub fn new(
        service: impl Into<String>,
        identifier: impl Into<String>,
        password: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            service: service.into().trim_end_matches('/').to_string(),
            identifier: identifier.into(),
            password: password.into(),
            session: OnceCell::new(),
        })
    }

    pub fn new_from_env(service: &str) -> anyhow::Result<Self> {
        match (env::var(HANDLE_ENV), env::var(PASSWORD_ENV)) {
            (Ok(identifier), Ok(password)) => {
                tracing::info!(
                    handle = %identifier,
                    password_set = !password.is_empty(),
                    service,
                    "Initialized BlueskyClient from environment"
                );
                Self::new(service, identifier, password)
            }
            (Err(e), _) => {
                tracing::error!(error = ?e, "{HANDLE_ENV} missing in environment");
                Err(anyhow::anyhow!("{HANDLE_ENV} must be set: {e}"))
            }
            (_, Err(e)) => {
                tracing::error!(error = ?e, "{PASSWORD_ENV} missing in environment");
                Err(anyhow::anyhow!("{PASSWORD_ENV} must be set: {e}"))
            }
        }
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    async fn session(&self) -> Result<&Session, PublishError> {
        self.session.get_or_try_init(|| self.create_session()).await
    }

    async fn create_session(&self) -> Result<Session, PublishError> {
        tracing::info!(handle = %self.identifier, "Creating Bluesky session");
        let response = self
            .http
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.identifier,
                "password": self.password,
            }))
            .send()
            .await
            .map_err(|e| PublishError::Submit(format!("createSession request failed: {e}")))?;

        let response = check_status(response, "createSession").await?;
        let session: Session = response
            .json()
            .await
            .map_err(|e| PublishError::Auth(format!("unreadable session response: {e}")))?;
        tracing::info!(did = %session.did, "Bluesky session established");
        Ok(session)
    }
}

#[async_trait]
impl Publisher for BlueskyClient {
    async fn publish<'a>(&self, req: PostRequest<'a>) -> Result<PostResult, PublishError> {
        let session = self.session().await?;
        let record = build_post_record(req.title, req.link, &now_timestamp());

        tracing::info!(link = req.link, "Submitting post");
        let response = self
            .http
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| PublishError::Submit(format!("createRecord request failed: {e}")))?;

        let response = check_status(response, "createRecord").await?;
        let created: CreatedRecord = response
            .json()
            .await
            .map_err(|e| PublishError::Submit(format!("unreadable createRecord response: {e}")))?;
        Ok(PostResult { uri: created.uri })
    }
}

async fn check_status(response: Response, method: &str) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let xrpc: XrpcError = serde_json::from_str(&body).unwrap_or_default();
    tracing::error!(method, %status, error = %xrpc.error, message = %xrpc.message, "XRPC call failed");
    Err(classify_failure(status, &xrpc.error, &xrpc.message, method))
}

fn classify_failure(status: StatusCode, error: &str, message: &str, method: &str) -> PublishError {
    let detail = format!("{method} returned {status}: {error} {message}")
        .trim_end()
        .to_string();
    let auth_status = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN);
    if auth_status || AUTH_ERRORS.contains(&error) {
        PublishError::Auth(detail)
    } else {
        PublishError::Submit(detail)
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Post text: the title, a newline, then the link. The title is cut short with `…`
/// when the whole text would exceed the post length limit.
pub fn format_post(title: &str, link: &str) -> String {
    let budget = MAX_POST_CHARS.saturating_sub(link.chars().count() + 1);
    let title = if title.chars().count() > budget {
        let mut short: String = title.chars().take(budget.saturating_sub(1)).collect();
        short.truncate(short.trim_end().len());
        short.push('…');
        short
    } else {
        title.to_string()
    };
    format!("{title}\n{link}")
}

/// The `app.bsky.feed.post` record for an announcement.
pub fn build_post_record(title: &str, link: &str, created_at: &str) -> Value {
    let text = format_post(title, link);
    let mut record = json!({
        "$type": "app.bsky.feed.post",
        "text": text,
        "createdAt": created_at,
    });
    if !link.is_empty() {
        // facet offsets are UTF-8 byte positions
        let byte_end = text.len();
        let byte_start = byte_end - link.len();
        record["facets"] = json!([{
            "index": { "byteStart": byte_start, "byteEnd": byte_end },
            "features": [{ "$type": "app.bsky.richtext.facet#link", "uri": link }],
        }]);
    }
    record
}
