//! Adaptive per-host rate limiter.
//!
//! Tracks request timing per host and adapts delays based on responses.
//! Backs off on 429/503, gradually recovers on success.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Configuration for rate limiting behavior.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Base delay between requests to the same host.
    pub base_delay: Duration,
    /// Minimum delay (floor).
    pub min_delay: Duration,
    /// Maximum delay (ceiling for backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff on rate limit.
    pub backoff_multiplier: f64,
    /// Multiplier for recovery on success (< 1.0 to decrease delay).
    pub recovery_multiplier: f64,
    /// Number of consecutive successes before reducing delay.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
        }
    }
}

#[derive(Debug, Clone)]
struct HostState {
    current_delay: Duration,
    last_request: Option<Instant>,
    consecutive_successes: u32,
    in_backoff: bool,
    total_requests: u64,
    rate_limit_hits: u64,
}

impl HostState {
    fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            last_request: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Claim the next free slot. Slots of one host are at least
    /// `current_delay` apart.
    fn reserve(&mut self, now: Instant) -> Instant {
        let slot = match self.last_request {
            Some(last) => (last + self.current_delay).max(now),
            None => now,
        };
        self.last_request = Some(slot);
        self.total_requests += 1;
        slot
    }
}

/// Adaptive rate limiter shared by every request of a session.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    hosts: Arc<RwLock<HashMap<String, HostState>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            hosts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Extract host from URL.
    pub fn extract_host(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Reserve a request slot for the host and wait for it.
    /// Returns the host, or None for URLs without one.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let host = Self::extract_host(url)?;

        let slot = {
            let mut hosts = self.hosts.write().await;
            hosts
                .entry(host.clone())
                .or_insert_with(|| HostState::new(self.config.base_delay))
                .reserve(Instant::now())
        };

        let wait_time = slot.saturating_duration_since(Instant::now());
        if wait_time > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", host, wait_time);
            tokio::time::sleep_until(slot).await;
        }

        Some(host)
    }

    /// Report a response status for a host.
    pub async fn report_status(&self, host: &str, status_code: u16) {
        if Self::is_rate_limit(status_code) {
            self.report_rate_limit(host, status_code).await;
        } else if status_code >= 500 {
            self.report_server_error(host).await;
        } else if (200..400).contains(&status_code) {
            self.report_success(host).await;
        }
    }

    pub fn is_rate_limit(status_code: u16) -> bool {
        matches!(status_code, 429 | 503)
    }

    /// Report a successful request - may decrease delay.
    pub async fn report_success(&self, host: &str) {
        let mut hosts = self.hosts.write().await;
        if let Some(state) = hosts.get_mut(host) {
            state.consecutive_successes += 1;

            if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
                let new_delay = Duration::from_secs_f64(
                    state.current_delay.as_secs_f64() * self.config.recovery_multiplier,
                );
                state.current_delay = new_delay.max(self.config.min_delay);

                if state.current_delay <= self.config.base_delay {
                    state.in_backoff = false;
                    state.current_delay = self.config.base_delay;
                    info!("Host {} recovered from rate limit backoff", host);
                } else {
                    debug!("Host {} delay reduced to {:?}", host, state.current_delay);
                }

                state.consecutive_successes = 0;
            }
        }
    }

    /// Report a rate limit hit (429 or 503) - increases delay.
    pub async fn report_rate_limit(&self, host: &str, status_code: u16) {
        let mut hosts = self.hosts.write().await;
        if let Some(state) = hosts.get_mut(host) {
            state.rate_limit_hits += 1;
            state.consecutive_successes = 0;
            state.in_backoff = true;

            let new_delay = Duration::from_secs_f64(
                state.current_delay.as_secs_f64() * self.config.backoff_multiplier,
            );
            state.current_delay = new_delay.min(self.config.max_delay);

            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                host, status_code, state.current_delay
            );
        }
    }

    /// Report a server error (5xx other than 503) - mild backoff.
    pub async fn report_server_error(&self, host: &str) {
        let mut hosts = self.hosts.write().await;
        if let Some(state) = hosts.get_mut(host) {
            let new_delay = Duration::from_secs_f64(state.current_delay.as_secs_f64() * 1.5);
            state.current_delay = new_delay.min(self.config.max_delay);
            debug!(
                "Server error for {}, delay increased to {:?}",
                host, state.current_delay
            );
        }
    }

    /// Statistics for every host seen so far.
    pub async fn get_stats(&self) -> HashMap<String, HostStats> {
        let hosts = self.hosts.read().await;
        hosts
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    HostStats {
                        current_delay: v.current_delay,
                        in_backoff: v.in_backoff,
                        total_requests: v.total_requests,
                        rate_limit_hits: v.rate_limit_hits,
                    },
                )
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for a host.
#[derive(Debug, Clone)]
pub struct HostStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host() {
        assert_eq!(
            RateLimiter::extract_host("https://fr.wikipedia.org/api/rest_v1/page/summary/Pica_pica"),
            Some("fr.wikipedia.org".to_string())
        );
        assert_eq!(RateLimiter::extract_host("not a url"), None);
    }

    #[tokio::test]
    async fn test_backoff_on_rate_limit() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            ..Default::default()
        });

        limiter.acquire("https://api.flickr.com/services/feeds").await;
        limiter.report_status("api.flickr.com", 429).await;

        let stats = limiter.get_stats().await;
        let host_stats = stats.get("api.flickr.com").unwrap();
        assert!(host_stats.current_delay >= Duration::from_millis(200));
        assert!(host_stats.in_backoff);
        assert_eq!(host_stats.rate_limit_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_are_spaced() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            base_delay: Duration::from_millis(200),
            ..Default::default()
        });

        let start = Instant::now();
        let mut finished = futures::future::join_all((0..5).map(|_| {
            let limiter = limiter.clone();
            async move {
                limiter.acquire("https://fr.wikipedia.org/a").await;
                Instant::now()
            }
        }))
        .await;

        assert!(start.elapsed() >= Duration::from_millis(800));
        finished.sort();
        for pair in finished.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(200));
        }

        let stats = limiter.get_stats().await;
        assert_eq!(stats.get("fr.wikipedia.org").unwrap().total_requests, 5);
    }

    #[tokio::test]
    async fn test_recovery_after_successes() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            base_delay: Duration::from_millis(10),
            min_delay: Duration::from_millis(1),
            recovery_threshold: 1,
            recovery_multiplier: 0.1,
            ..Default::default()
        });

        limiter.acquire("https://example.org/a").await;
        limiter.report_rate_limit("example.org", 503).await;
        limiter.report_success("example.org").await;

        let stats = limiter.get_stats().await;
        let host_stats = stats.get("example.org").unwrap();
        assert!(!host_stats.in_backoff);
        assert_eq!(host_stats.current_delay, Duration::from_millis(10));
    }
}
