//! Network access for the feed and the illustration lookups.
//!
//! Everything above this module talks to the network through [`JsonFetcher`]
//! and [`ImageProbe`], so sessions can run against stubs in tests.

mod http_client;
mod rate_limiter;

pub use http_client::{resolve_user_agent, HttpClient};
pub use rate_limiter::{HostStats, RateLimitConfig, RateLimiter};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// How a request may interact with caches along the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Always go to the origin (the detection feed).
    NoStore,
    /// Answers never change during a session (illustration lookups).
    Immutable,
}

/// Errors from a single fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid JSON: {0}")]
    Decode(String),
    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// GET a URL and decode the body as JSON.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn get_json(&self, url: &str, policy: CachePolicy) -> Result<Value, FetchError>;
}

/// Load the image data behind a URL. True once the data arrived intact.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn load(&self, url: &str) -> bool;
}
