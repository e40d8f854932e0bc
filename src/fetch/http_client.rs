//! HTTP client with per-host rate limiting and a session response cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Client, Response};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::rate_limiter::RateLimiter;
use super::{CachePolicy, FetchError, ImageProbe, JsonFetcher};

const USER_AGENT: &str = "birdfeed/0.4 (bird detection feed; github.com/cpa/oiseauxdemassy)";

/// Resolve user agent from config value.
/// - None => default birdfeed user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some(custom) if custom.trim().is_empty() => USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}

/// HTTP client shared by the feed fetch and every illustration lookup.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
    responses: Arc<RwLock<HashMap<String, Value>>>,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_user_agent(timeout, None)
    }

    /// Create a new HTTP client with custom user agent configuration.
    pub fn with_user_agent(
        timeout: Duration,
        user_agent_config: Option<&str>,
    ) -> Result<Self, FetchError> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::new(),
            responses: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Share a rate limiter with other clients.
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Get the rate limiter for this client.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Number of JSON bodies held by the session response cache.
    pub async fn cached_responses(&self) -> usize {
        self.responses.read().await.len()
    }

    /// Make a GET request, honoring the cache policy and the rate limiter.
    /// Non-success statuses are returned as [`FetchError::Status`].
    pub async fn get(&self, url: &str, policy: CachePolicy) -> Result<Response, FetchError> {
        let host = self.rate_limiter.acquire(url).await;

        let mut request = self.client.get(url);
        if policy == CachePolicy::NoStore {
            request = request
                .header(CACHE_CONTROL, "no-cache, no-store")
                .header(PRAGMA, "no-cache");
        }

        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        debug!(
            "GET {} -> {} in {}ms",
            url,
            status.as_u16(),
            start.elapsed().as_millis()
        );

        if let Some(ref host) = host {
            self.rate_limiter.report_status(host, status.as_u16()).await;
        }

        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl JsonFetcher for HttpClient {
    async fn get_json(&self, url: &str, policy: CachePolicy) -> Result<Value, FetchError> {
        if policy == CachePolicy::Immutable {
            if let Some(hit) = self.responses.read().await.get(url) {
                debug!("Response cache hit for {}", url);
                return Ok(hit.clone());
            }
        }

        let response = self.get(url, policy).await?;
        let body = response.text().await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        if policy == CachePolicy::Immutable {
            self.responses
                .write()
                .await
                .insert(url.to_string(), value.clone());
        }
        Ok(value)
    }
}

#[async_trait]
impl ImageProbe for HttpClient {
    async fn load(&self, url: &str) -> bool {
        let response = match self.get(url, CachePolicy::Immutable).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Image {} failed to load: {}", url, e);
                return false;
            }
        };
        match response.bytes().await {
            Ok(bytes) => !bytes.is_empty(),
            Err(e) => {
                warn!("Image {} body failed: {}", url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_resolve_user_agent_default() {
        let ua = resolve_user_agent(None);
        assert!(ua.starts_with("birdfeed/"));
    }

    #[test]
    fn test_resolve_user_agent_blank_is_default() {
        assert_eq!(resolve_user_agent(Some("  ")), resolve_user_agent(None));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        let ua = resolve_user_agent(Some("MyBot/1.0"));
        assert_eq!(ua, "MyBot/1.0");
    }

    /// Serve `body` as JSON to every request and keep each request head,
    /// lowercased.
    async fn serve(body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let seen = seen.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    seen.lock()
                        .unwrap()
                        .push(String::from_utf8_lossy(&head).to_lowercase());
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), requests)
    }

    #[tokio::test]
    async fn test_immutable_responses_are_memoized() {
        let (base, requests) = serve(r#"{"thumbnail": {"source": "https://x/a.jpg"}}"#).await;
        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let url = format!("{base}/summary/Parus_major");

        let first = client.get_json(&url, CachePolicy::Immutable).await.unwrap();
        let second = client.get_json(&url, CachePolicy::Immutable).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first["thumbnail"]["source"], "https://x/a.jpg");
        assert_eq!(requests.lock().unwrap().len(), 1);
        assert_eq!(client.cached_responses().await, 1);
    }

    #[tokio::test]
    async fn test_no_store_always_hits_origin() {
        let (base, requests) = serve("[]").await;
        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let url = format!("{base}/birddb.json");

        client.get_json(&url, CachePolicy::NoStore).await.unwrap();
        client.get_json(&url, CachePolicy::NoStore).await.unwrap();

        let requests = requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        for head in &requests {
            assert!(head.contains("cache-control: no-cache, no-store"));
            assert!(head.contains("pragma: no-cache"));
        }
        assert_eq!(client.cached_responses().await, 0);
    }

    #[tokio::test]
    async fn test_empty_image_body_fails_probe() {
        let (base, _) = serve("").await;
        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        assert!(!client.load(&format!("{base}/empty.jpg")).await);

        let (base, _) = serve("GIF89a").await;
        assert!(client.load(&format!("{base}/bird.gif")).await);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let client = HttpClient::new(Duration::from_secs(2)).unwrap();
        let err = client
            .get_json("http://127.0.0.1:9/feed.json", CachePolicy::NoStore)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_) | FetchError::Timeout));
        assert_eq!(client.cached_responses().await, 0);
    }
}
