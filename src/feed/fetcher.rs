use crate::feed::parser::{parse_feed, FeedEntry};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_RETRIES: u32 = 3;

/// Errors that can occur while retrieving and parsing a feed.
///
/// Any of these is fatal to the run: a feed the worker cannot retrieve or
/// parse leaves nothing to deduplicate.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The configured sourcelocation is not a fetchable http(s) URL
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Caller-supplied bounds for a fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum response body size in bytes.
    pub max_bytes: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Retrieve and parse the feed at `url`, returning entries in feed order.
///
/// # Behavior
///
/// - Each request is bounded by `limits.timeout`
/// - Rate limiting (HTTP 429) and server errors (5xx) trigger exponential
///   backoff with up to 3 retries; 4xx fails immediately
/// - Response bodies are limited to `limits.max_bytes`
/// - Truncated bodies (fewer bytes than Content-Length) are retried
///
/// # Errors
///
/// See [`FetchError`]. An empty-but-valid feed is `Ok(vec![])`, not an error;
/// the pipeline decides what an empty run means.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    limits: FetchLimits,
) -> Result<Vec<FeedEntry>, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme: {}",
                scheme
            )))
        }
    }

    let mut retry_count = 0;

    let bytes = loop {
        let response = tokio::time::timeout(limits.timeout, client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        // Rate limiting: back off and retry
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retry_count >= MAX_RETRIES {
                return Err(FetchError::RateLimited(MAX_RETRIES));
            }

            let delay_secs = 2u64.pow(retry_count); // 2s, 4s, 8s
            tracing::warn!(
                feed = %url,
                retry = retry_count,
                delay_secs = delay_secs,
                "Rate limited, backing off"
            );

            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            retry_count += 1;
            continue;
        }

        // Server errors (5xx) are transient often enough to be worth retrying
        if response.status().is_server_error() {
            if retry_count >= MAX_RETRIES {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            let delay_secs = 2u64.pow(retry_count);
            tracing::warn!(
                feed = %url,
                status = %response.status(),
                retry = retry_count,
                delay_secs = delay_secs,
                "Server error, retrying after delay"
            );

            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            retry_count += 1;
            continue;
        }

        // Remaining 4xx errors fail immediately
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        match read_limited_bytes(response, limits.max_bytes).await {
            Ok(bytes) => break bytes,
            Err(FetchError::IncompleteResponse { expected, received }) => {
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }

                let delay_secs = 2u64.pow(retry_count);
                tracing::debug!(
                    feed = %url,
                    expected = expected,
                    received = received,
                    attempt = retry_count + 1,
                    delay_secs = delay_secs,
                    "Retrying incomplete download"
                );

                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
    };

    parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // Fewer bytes than Content-Length means the download was cut short;
    // callers retry with backoff.
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item>
        <title>Test</title>
        <link>https://example.com/test</link>
        <description>Body</description>
        <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
    </item>
</channel></rss>"#;

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let entries = fetch_feed(
            &client,
            &format!("{}/feed", mock_server.uri()),
            FetchLimits::default(),
        )
        .await
        .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Test");
    }

    #[tokio::test]
    async fn test_fetch_404_fails_immediately() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1) // no retries for 4xx
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_feed(
            &client,
            &format!("{}/feed", mock_server.uri()),
            FetchLimits::default(),
        )
        .await;

        match result.unwrap_err() {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        use wiremock::matchers::any;

        let mock_server = MockServer::start().await;

        // First request returns 503, second succeeds
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let entries = fetch_feed(
            &client,
            &format!("{}/feed", mock_server.uri()),
            FetchLimits::default(),
        )
        .await
        .unwrap();

        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_feed_is_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_feed(
            &client,
            &format!("{}/feed", mock_server.uri()),
            FetchLimits::default(),
        )
        .await;

        match result.unwrap_err() {
            FetchError::Parse(_) => {}
            e => panic!("Expected Parse error, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_empty_feed_is_ok() {
        let empty_rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel></channel></rss>"#;

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(empty_rss))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let entries = fetch_feed(
            &client,
            &format!("{}/feed", mock_server.uri()),
            FetchLimits::default(),
        )
        .await
        .unwrap();

        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_non_http_scheme_rejected() {
        let client = reqwest::Client::new();
        let result = fetch_feed(&client, "file:///etc/passwd", FetchLimits::default()).await;

        match result.unwrap_err() {
            FetchError::InvalidUrl(_) => {}
            e => panic!("Expected InvalidUrl, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let limits = FetchLimits {
            timeout: Duration::from_secs(30),
            max_bytes: 1024,
        };
        let result = fetch_feed(&client, &format!("{}/feed", mock_server.uri()), limits).await;

        match result.unwrap_err() {
            FetchError::ResponseTooLarge => {}
            e => panic!("Expected ResponseTooLarge, got {:?}", e),
        }
    }
}
