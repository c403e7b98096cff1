use crate::feed::parser::{parse_feed, ParsedFeed};
use crate::retry::{RetryPolicy, Retryable};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Budget for one feed request, body included.
pub const FEED_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Some podcast hosts refuse requests that do not look like a browser.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Number of body characters kept in [`FetchError::InvalidFeedContent`].
const PREFIX_CHARS: usize = 100;

/// Errors that can occur while fetching and parsing one feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Body does not look like an XML feed
    #[error("Invalid feed content (content-type {content_type:?}): {prefix:?}")]
    InvalidFeedContent {
        content_type: Option<String>,
        prefix: String,
    },
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        // An oversized feed will be oversized on the next attempt too
        !matches!(self, FetchError::ResponseTooLarge)
    }
}

/// Builds the HTTP client shared by every feed fetch of a run.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
}

/// Fetches, validates and parses one feed, retrying per `policy`.
///
/// # Errors
///
/// The last attempt's error once retries are exhausted, or the first
/// non-retryable one:
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - Request and body exceeded 10 seconds
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::InvalidFeedContent`] - Body is not XML
/// - [`FetchError::ResponseTooLarge`] - Response exceeded 10MB
/// - [`FetchError::Parse`] - Invalid RSS/Atom XML
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    policy: &RetryPolicy,
) -> Result<ParsedFeed, FetchError> {
    policy
        .run(url, |attempt| async move {
            tracing::debug!(url = %url, attempt = attempt, "Fetching feed");
            fetch_once(client, url, FEED_TIMEOUT).await
        })
        .await
}

async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<ParsedFeed, FetchError> {
    let (body, content_type) = tokio::time::timeout(timeout, fetch_body(client, url))
        .await
        .map_err(|_| FetchError::Timeout)??;

    let text = String::from_utf8_lossy(&body);
    let cleaned = sanitize_feed_body(&text, content_type)?;
    parse_feed(cleaned).map_err(|e| FetchError::Parse(e.to_string()))
}

async fn fetch_body(
    client: &reqwest::Client,
    url: &str,
) -> Result<(Vec<u8>, Option<String>), FetchError> {
    let response = client.get(url).send().await?;

    // Validate HTTP status before reading the body
    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    Ok((bytes, content_type))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Strips leading BOMs and whitespace, in any order, and checks that what remains opens
/// like an XML feed (`<?xml`, `<rss` or `<feed`).
///
/// Returns the cleaned slice, ready for parsing.
pub fn sanitize_feed_body(
    body: &str,
    content_type: Option<String>,
) -> Result<&str, FetchError> {
    let trimmed = body
        .trim_start_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
        .trim_end();

    let is_xml_decl = trimmed
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("<?xml"));
    if is_xml_decl || trimmed.starts_with("<rss") || trimmed.starts_with("<feed") {
        return Ok(trimmed);
    }

    Err(FetchError::InvalidFeedContent {
        content_type,
        prefix: trimmed.chars().take(PREFIX_CHARS).collect(),
    })
}
