//! Two-stage illustration lookup for a species.
//!
//! The encyclopedia summary endpoint is asked first; the public photo feed is
//! only consulted when the summary has no usable image. Every failure along
//! the way degrades to "no image" and is never surfaced to the caller.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::fetch::{CachePolicy, JsonFetcher};
use crate::links::article_slug;

pub const DEFAULT_SUMMARY_BASE: &str = "https://fr.wikipedia.org/api/rest_v1/page/summary/";
pub const DEFAULT_PHOTO_FEED_URL: &str = "https://api.flickr.com/services/feeds/photos_public.gne";
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(8);

/// Endpoints and limits for the lookup stages.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub summary_base: String,
    pub photo_feed_url: String,
    /// Upper bound for each stage, request and decode included.
    pub lookup_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            summary_base: DEFAULT_SUMMARY_BASE.to_string(),
            photo_feed_url: DEFAULT_PHOTO_FEED_URL.to_string(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

/// Encyclopedia summary payload. Only the image fields matter here.
#[derive(Debug, Default, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    thumbnail: Option<ImageSource>,
    #[serde(default)]
    originalimage: Option<ImageSource>,
}

#[derive(Debug, Deserialize)]
struct ImageSource {
    #[serde(default)]
    source: Option<String>,
}

impl ImageSource {
    fn url(self) -> Option<String> {
        self.source.filter(|s| !s.trim().is_empty())
    }
}

/// What the summary offered, thumbnail preferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryImage {
    Thumbnail(String),
    Original(String),
    NoThumbnail,
}

impl From<SummaryResponse> for SummaryImage {
    fn from(summary: SummaryResponse) -> Self {
        if let Some(url) = summary.thumbnail.and_then(ImageSource::url) {
            return SummaryImage::Thumbnail(url);
        }
        if let Some(url) = summary.originalimage.and_then(ImageSource::url) {
            return SummaryImage::Original(url);
        }
        SummaryImage::NoThumbnail
    }
}

/// Public photo feed payload.
#[derive(Debug, Default, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    media: Option<FeedMedia>,
}

#[derive(Debug, Deserialize)]
struct FeedMedia {
    #[serde(default)]
    m: Option<String>,
}

/// What the photo feed offered: the first item's media URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedImage {
    Media(String),
    NoMediaItem,
}

impl From<FeedResponse> for FeedImage {
    fn from(feed: FeedResponse) -> Self {
        feed.items
            .into_iter()
            .next()
            .and_then(|item| item.media)
            .and_then(|media| media.m)
            .filter(|m| !m.trim().is_empty())
            .map(FeedImage::Media)
            .unwrap_or(FeedImage::NoMediaItem)
    }
}

/// Outcome of a full lookup for one species.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLookup {
    Encyclopedia(String),
    PhotoFeed(String),
    NotFound,
}

impl ImageLookup {
    /// The resolved URL, or "" when nothing was found.
    pub fn url(&self) -> &str {
        match self {
            ImageLookup::Encyclopedia(url) | ImageLookup::PhotoFeed(url) => url,
            ImageLookup::NotFound => "",
        }
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, ImageLookup::NotFound)
    }
}

/// Resolves species names to illustration URLs.
#[derive(Clone)]
pub struct ImageResolver {
    fetcher: Arc<dyn JsonFetcher>,
    config: ResolverConfig,
}

impl ImageResolver {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, config: ResolverConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Summary endpoint for a trimmed, non-empty name.
    pub fn summary_url(&self, name: &str) -> String {
        format!(
            "{}{}",
            self.config.summary_base,
            urlencoding::encode(&article_slug(name))
        )
    }

    /// Photo feed endpoint tagged with the name.
    pub fn feed_url(&self, name: &str) -> Option<String> {
        Url::parse_with_params(
            &self.config.photo_feed_url,
            &[("tags", name), ("format", "json"), ("nojsoncallback", "1")],
        )
        .map(String::from)
        .ok()
    }

    /// Look up an illustration. Never fails; an empty name makes no request.
    pub async fn resolve(&self, name: &str) -> ImageLookup {
        let name = name.trim();
        if name.is_empty() {
            return ImageLookup::NotFound;
        }

        match self.encyclopedia(name).await {
            SummaryImage::Thumbnail(url) | SummaryImage::Original(url) => {
                return ImageLookup::Encyclopedia(url);
            }
            SummaryImage::NoThumbnail => {
                debug!("No encyclopedia image for {}, trying photo feed", name);
            }
        }

        match self.photo_feed(name).await {
            FeedImage::Media(url) => ImageLookup::PhotoFeed(url),
            FeedImage::NoMediaItem => {
                debug!("No illustration found for {}", name);
                ImageLookup::NotFound
            }
        }
    }

    async fn encyclopedia(&self, name: &str) -> SummaryImage {
        let url = self.summary_url(name);
        match self.fetch_stage(&url).await {
            Some(value) => serde_json::from_value::<SummaryResponse>(value)
                .unwrap_or_default()
                .into(),
            None => SummaryImage::NoThumbnail,
        }
    }

    async fn photo_feed(&self, name: &str) -> FeedImage {
        let Some(url) = self.feed_url(name) else {
            warn!("Photo feed URL {:?} is invalid", self.config.photo_feed_url);
            return FeedImage::NoMediaItem;
        };
        match self.fetch_stage(&url).await {
            Some(value) => serde_json::from_value::<FeedResponse>(value)
                .unwrap_or_default()
                .into(),
            None => FeedImage::NoMediaItem,
        }
    }

    /// One bounded request. Failures are logged and swallowed.
    async fn fetch_stage(&self, url: &str) -> Option<Value> {
        let request = self.fetcher.get_json(url, CachePolicy::Immutable);
        match tokio::time::timeout(self.config.lookup_timeout, request).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("Lookup {} failed: {}", url, e);
                None
            }
            Err(_) => {
                warn!("Lookup {} timed out", url);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers by URL prefix and records every requested URL.
    #[derive(Default)]
    struct ScriptedFetcher {
        routes: Vec<(&'static str, Result<Value, FetchError>)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn route(mut self, prefix: &'static str, answer: Result<Value, FetchError>) -> Self {
            self.routes.push((prefix, answer));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JsonFetcher for ScriptedFetcher {
        async fn get_json(&self, url: &str, _policy: CachePolicy) -> Result<Value, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.routes
                .iter()
                .find(|(prefix, _)| url.starts_with(prefix))
                .map(|(_, answer)| answer.clone())
                .unwrap_or(Err(FetchError::Status(404)))
        }
    }

    fn resolver(fetcher: Arc<ScriptedFetcher>) -> ImageResolver {
        ImageResolver::new(fetcher, ResolverConfig::default())
    }

    #[tokio::test]
    async fn test_thumbnail_wins_without_fallback() {
        let fetcher = Arc::new(ScriptedFetcher::default().route(
            DEFAULT_SUMMARY_BASE,
            Ok(json!({"thumbnail": {"source": "https://x/img.jpg"}})),
        ));
        let lookup = resolver(fetcher.clone()).resolve("Parus major").await;

        assert_eq!(lookup, ImageLookup::Encyclopedia("https://x/img.jpg".into()));
        assert_eq!(lookup.url(), "https://x/img.jpg");
        assert_eq!(
            fetcher.calls(),
            vec![format!("{DEFAULT_SUMMARY_BASE}Parus_major")]
        );
    }

    #[tokio::test]
    async fn test_original_image_when_no_thumbnail() {
        let fetcher = Arc::new(ScriptedFetcher::default().route(
            DEFAULT_SUMMARY_BASE,
            Ok(json!({"originalimage": {"source": "https://x/full.jpg"}})),
        ));
        let lookup = resolver(fetcher).resolve("Pica pica").await;
        assert_eq!(lookup, ImageLookup::Encyclopedia("https://x/full.jpg".into()));
    }

    #[tokio::test]
    async fn test_falls_back_to_photo_feed() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .route(DEFAULT_SUMMARY_BASE, Err(FetchError::Status(404)))
                .route(
                    DEFAULT_PHOTO_FEED_URL,
                    Ok(json!({"items": [{"media": {"m": "https://live/1_m.jpg"}}, {"media": {"m": "https://live/2_m.jpg"}}]})),
                ),
        );
        let lookup = resolver(fetcher.clone()).resolve(" Turdus merula ").await;

        assert_eq!(lookup, ImageLookup::PhotoFeed("https://live/1_m.jpg".into()));
        let calls = fetcher.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].contains("tags=Turdus+merula"));
        assert!(calls[1].contains("format=json"));
        assert!(calls[1].contains("nojsoncallback=1"));
    }

    /// Summary endpoint that never answers; the photo feed answers at once.
    struct StalledSummary;

    #[async_trait]
    impl JsonFetcher for StalledSummary {
        async fn get_json(&self, url: &str, _policy: CachePolicy) -> Result<Value, FetchError> {
            if url.starts_with(DEFAULT_SUMMARY_BASE) {
                futures::future::pending::<()>().await;
            }
            Ok(json!({"items": [{"media": {"m": "https://live/slow_m.jpg"}}]}))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_summary_times_out_to_photo_feed() {
        let resolver = ImageResolver::new(
            Arc::new(StalledSummary),
            ResolverConfig {
                lookup_timeout: Duration::from_secs(8),
                ..Default::default()
            },
        );

        let start = tokio::time::Instant::now();
        let lookup = resolver.resolve("Sitta europaea").await;

        assert_eq!(lookup, ImageLookup::PhotoFeed("https://live/slow_m.jpg".into()));
        assert!(start.elapsed() >= Duration::from_secs(8));
        assert!(start.elapsed() < Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_both_stages_empty() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .route(DEFAULT_SUMMARY_BASE, Ok(json!({"title": "Parus major"})))
                .route(DEFAULT_PHOTO_FEED_URL, Ok(json!({"items": []}))),
        );
        let lookup = resolver(fetcher).resolve("Parus major").await;
        assert_eq!(lookup, ImageLookup::NotFound);
        assert_eq!(lookup.url(), "");
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_swallowed() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .route(DEFAULT_SUMMARY_BASE, Ok(json!({"thumbnail": {"source": 42}})))
                .route(DEFAULT_PHOTO_FEED_URL, Err(FetchError::Decode("bad".into()))),
        );
        assert_eq!(
            resolver(fetcher).resolve("Parus major").await,
            ImageLookup::NotFound
        );
    }

    #[tokio::test]
    async fn test_blank_name_makes_no_request() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let lookup = resolver(fetcher.clone()).resolve("   ").await;
        assert_eq!(lookup, ImageLookup::NotFound);
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn test_summary_image_precedence() {
        let summary = SummaryResponse {
            thumbnail: Some(ImageSource { source: Some(String::new()) }),
            originalimage: Some(ImageSource { source: Some("https://o".into()) }),
        };
        assert_eq!(SummaryImage::from(summary), SummaryImage::Original("https://o".into()));
        assert_eq!(
            SummaryImage::from(SummaryResponse::default()),
            SummaryImage::NoThumbnail
        );
    }
}
