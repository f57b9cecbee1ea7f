//! One-shot REST snapshot: `GET {base}/news?limit=N` into the feed store.

use super::store::FeedStore;
use super::wire::decode_article_list;
use super::Article;
use crate::util::{join_path, validate_pull_endpoint, EndpointError};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default number of articles requested by the startup snapshot.
pub const DEFAULT_SNAPSHOT_LIMIT: u32 = 50;
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_SNAPSHOT_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching the feed snapshot.
///
/// None of these are retried; the snapshot is a one-shot seed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The configured base endpoint is unusable
    #[error("Invalid API endpoint: {0}")]
    Endpoint(#[from] EndpointError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Body was not a JSON document
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// One-shot pull client for `GET {base}/news?limit=N`.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    client: reqwest::Client,
    news_url: Url,
    timeout: Duration,
}

impl SnapshotFetcher {
    /// Builds a fetcher for `api_endpoint` with its own HTTP client.
    pub fn new(api_endpoint: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("newswire/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(client, api_endpoint, timeout)
    }

    /// Builds a fetcher that reuses an existing client.
    pub fn with_client(
        client: reqwest::Client,
        api_endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let base = validate_pull_endpoint(api_endpoint)?;
        let news_url = join_path(&base, "news")?;
        Ok(Self {
            client,
            news_url,
            timeout,
        })
    }

    /// Requests up to `limit` of the most recent articles.
    ///
    /// A 2xx body without an `articles` list yields an empty vector. Entries
    /// that fail to decode are skipped and logged.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - connection or TLS errors
    /// - [`FetchError::Timeout`] - request exceeded the timeout
    /// - [`FetchError::HttpStatus`] - any non-2xx response
    /// - [`FetchError::ResponseTooLarge`] - body exceeded 10MB
    /// - [`FetchError::Parse`] - body was not JSON
    pub async fn fetch_latest(&self, limit: u32) -> Result<Vec<Article>, FetchError> {
        let mut url = self.news_url.clone();
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());

        tracing::debug!(url = %url, "Fetching feed snapshot");

        let response = tokio::time::timeout(self.timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(
                url = %url,
                status = %status,
                "Snapshot request returned non-success status"
            );
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = tokio::time::timeout(
            self.timeout,
            read_limited_bytes(response, MAX_SNAPSHOT_SIZE),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;

        let body: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

        let articles = body.get("articles").cloned().unwrap_or_default();
        let batch = decode_article_list(articles);
        if batch.skipped > 0 {
            tracing::warn!(
                skipped = batch.skipped,
                "Malformed articles skipped in snapshot"
            );
        }

        Ok(batch.articles)
    }

    /// Fetches a snapshot and, on success, overwrites `store` with it.
    ///
    /// On failure the store is left untouched and the error is returned for
    /// the caller to surface. Returns the resulting feed length.
    pub async fn seed(&self, store: &FeedStore, limit: u32) -> Result<usize, FetchError> {
        match self.fetch_latest(limit).await {
            Ok(articles) => {
                let received = articles.len();
                let len = store.replace(articles);
                tracing::info!(received, len, "Feed seeded from snapshot");
                Ok(len)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch feed snapshot");
                Err(e)
            }
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
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

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer) -> SnapshotFetcher {
        SnapshotFetcher::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_sends_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "articles": [{"articleId": "x", "title": "X"}, {"articleId": "w"}],
                "count": 2
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let articles = fetcher(&mock_server)
            .fetch_latest(DEFAULT_SNAPSHOT_LIMIT)
            .await
            .unwrap();
        let ids: Vec<_> = articles.iter().map(|a| a.article_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "w"]);
    }

    #[tokio::test]
    async fn test_stage_prefix_preserved() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prod/news"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"articles": []})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let f = SnapshotFetcher::new(&format!("{}/prod", mock_server.uri()), Duration::from_secs(5))
            .unwrap();
        assert!(f.fetch_latest(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_articles_key_is_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 0})))
            .mount(&mock_server)
            .await;

        assert!(fetcher(&mock_server).fetch_latest(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_500_fails_without_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        match fetcher(&mock_server).fetch_latest(5).await.unwrap_err() {
            FetchError::HttpStatus(500) => {}
            e => panic!("Expected HttpStatus(500), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            fetcher(&mock_server).fetch_latest(5).await,
            Err(FetchError::HttpStatus(404))
        ));
    }

    #[tokio::test]
    async fn test_non_json_body_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            fetcher(&mock_server).fetch_latest(5).await,
            Err(FetchError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"articles": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let f = SnapshotFetcher::new(&mock_server.uri(), Duration::from_millis(50)).unwrap();
        assert!(matches!(f.fetch_latest(5).await, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_seed_replaces_store() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "articles": [{"articleId": "x"}]
            })))
            .mount(&mock_server)
            .await;

        let store = FeedStore::new();
        store.ingest(Article::new("y", "pushed first"));

        let len = fetcher(&mock_server).seed(&store, 50).await.unwrap();
        assert_eq!(len, 1);
        let feed = store.current_feed();
        assert_eq!(feed.articles()[0].article_id, "x");
    }

    #[tokio::test]
    async fn test_seed_failure_leaves_store_untouched() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let store = FeedStore::new();
        store.ingest(Article::new("y", "kept"));

        assert!(fetcher(&mock_server).seed(&store, 50).await.is_err());
        assert_eq!(store.current_feed().articles()[0].article_id, "y");
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let err = SnapshotFetcher::new("wss://example.com", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, FetchError::Endpoint(_)));
    }
}
