//! One page load: fetch the feed, render it incrementally and load
//! illustrations as cards become visible.
//!
//! Visibility signals arrive on a channel and are consumed by a single loop
//! ([`Session::run`]) or one at a time ([`Session::handle`]). Batches render
//! synchronously inside the loop; image loads run as spawned tasks that
//! re-check the page before touching a card.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::fetch::{CachePolicy, FetchError, ImageProbe, JsonFetcher};
use crate::format::DisplayZone;
use crate::images::{ImageCache, ImageLoader, ImageOutcome, ImageResolver, ResolverConfig};
use crate::models::{fold_consecutive, sort_descending, unfolded, DetectionRecord};
use crate::render::{
    BatchRenderer, BatchReport, BatchState, CardId, CardOptions, Page, PageHandle,
    DEFAULT_PAGE_SIZE,
};

/// Prefix of the status line when the feed cannot be loaded.
pub const ERROR_PREFIX: &str = "Erreur: ";

pub const DEFAULT_DATA_URL: &str = "https://cpa.github.io/oiseauxdemassy/birddb.json";
pub const DEFAULT_SITE_TITLE: &str = "Les oiseaux de Palaiseau";

/// Fatal feed errors. Display strings are shown to the reader as-is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Echec du chargement JSON ({0})")]
    Status(u16),
    #[error("Le JSON doit etre un tableau.")]
    NotAnArray,
    #[error("JSON invalide: {0}")]
    Malformed(String),
    #[error("{0}")]
    Network(String),
    #[error("Délai dépassé lors du chargement")]
    Timeout,
}

impl From<FetchError> for LoadError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Status(code) => LoadError::Status(code),
            FetchError::Decode(msg) => LoadError::Malformed(msg),
            FetchError::Network(msg) => LoadError::Network(msg),
            FetchError::Timeout => LoadError::Timeout,
        }
    }
}

/// Everything a session needs to know about the feed and its presentation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub data_url: String,
    pub page_size: usize,
    pub site_title: String,
    pub sort_descending: bool,
    pub fold_consecutive: bool,
    pub cards: CardOptions,
    pub resolver: ResolverConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_url: DEFAULT_DATA_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            site_title: DEFAULT_SITE_TITLE.to_string(),
            sort_descending: true,
            fold_consecutive: true,
            cards: CardOptions::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            data_url: settings.data_url.clone(),
            page_size: settings.page_size,
            site_title: settings.site_title.clone(),
            sort_descending: settings.sort_descending,
            fold_consecutive: settings.fold_consecutive,
            cards: CardOptions {
                zone: settings.display_zone(),
                article_base: settings.article_base.clone(),
                show_confidence: settings.show_confidence,
            },
            resolver: ResolverConfig {
                summary_base: settings.summary_base.clone(),
                photo_feed_url: settings.photo_feed_url.clone(),
                lookup_timeout: settings.lookup_timeout(),
            },
        }
    }
}

/// A visibility signal from the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The sentinel below the last card scrolled into view.
    Sentinel,
    /// A card's image placeholder scrolled into view.
    Image(CardId),
    /// The page is going away.
    Unload,
}

/// What handling one signal did.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    Batch(BatchReport),
    ImageQueued(CardId),
    Ignored,
    Unloaded,
}

/// Cloneable sending side of a session's visibility channel.
#[derive(Debug, Clone)]
pub struct VisibilitySender {
    tx: mpsc::UnboundedSender<Visibility>,
}

impl VisibilitySender {
    /// Queue a signal. Returns false once the session is gone.
    pub fn send(&self, event: Visibility) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn sentinel_visible(&self) -> bool {
        self.send(Visibility::Sentinel)
    }

    pub fn image_visible(&self, id: CardId) -> bool {
        self.send(Visibility::Image(id))
    }

    pub fn unload(&self) -> bool {
        self.send(Visibility::Unload)
    }
}

/// Counts from a successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    /// Raw records in the feed.
    pub records: usize,
    /// Cards after folding.
    pub cards: usize,
    /// The first page, already on screen.
    pub first_batch: Option<BatchReport>,
}

/// Per-page-load controller. Nothing here outlives the session.
pub struct Session {
    config: SessionConfig,
    fetcher: Arc<dyn JsonFetcher>,
    page: PageHandle,
    renderer: BatchRenderer,
    loader: ImageLoader,
    tasks: JoinSet<(CardId, ImageOutcome)>,
    events_tx: mpsc::UnboundedSender<Visibility>,
    events_rx: mpsc::UnboundedReceiver<Visibility>,
    unloaded: bool,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        fetcher: Arc<dyn JsonFetcher>,
        probe: Arc<dyn ImageProbe>,
    ) -> Self {
        let resolver = ImageResolver::new(fetcher.clone(), config.resolver.clone());
        let loader = ImageLoader::new(ImageCache::new(resolver), probe);
        let renderer = BatchRenderer::new(
            config.page_size,
            config.cards.clone(),
            config.site_title.clone(),
        );
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            fetcher,
            page: Page::new().into_handle(),
            renderer,
            loader,
            tasks: JoinSet::new(),
            events_tx,
            events_rx,
            unloaded: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn page(&self) -> PageHandle {
        self.page.clone()
    }

    pub fn cache(&self) -> &ImageCache {
        self.loader.cache()
    }

    pub fn renderer(&self) -> &BatchRenderer {
        &self.renderer
    }

    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    /// Image loads spawned but not yet collected by [`Session::settle`].
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn observer(&self) -> VisibilitySender {
        VisibilitySender {
            tx: self.events_tx.clone(),
        }
    }

    fn zone(&self) -> DisplayZone {
        self.config.cards.zone
    }

    /// Fetch the feed and render the first page.
    ///
    /// On failure the status line shows the error and nothing is rendered.
    pub async fn load(&mut self) -> Result<LoadSummary, LoadError> {
        {
            let mut page = self.page.write().await;
            page.clear();
            self.renderer.abort(&mut page);
            page.set_status("Chargement…");
        }
        self.loader.reset();
        self.unloaded = false;

        let records = match self.fetch_records().await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to load {}: {}", self.config.data_url, e);
                self.page
                    .write()
                    .await
                    .set_status(format!("{ERROR_PREFIX}{e}"));
                return Err(e);
            }
        };

        let record_count = records.len();
        let detections = self.transform(records);
        let card_count = detections.len();
        info!(
            "Loaded {} records into {} cards from {}",
            record_count, card_count, self.config.data_url
        );

        {
            let mut page = self.page.write().await;
            self.renderer.reset(detections, record_count, &mut page);
        }
        let first_batch = self.render_batch().await;

        Ok(LoadSummary {
            records: record_count,
            cards: card_count,
            first_batch,
        })
    }

    async fn fetch_records(&self) -> Result<Vec<DetectionRecord>, LoadError> {
        let value = self
            .fetcher
            .get_json(&self.config.data_url, CachePolicy::NoStore)
            .await?;
        parse_records(value)
    }

    fn transform(&self, mut records: Vec<DetectionRecord>) -> Vec<crate::models::Detection> {
        let zone = self.zone();
        if self.config.sort_descending {
            sort_descending(&mut records, zone);
        }
        if self.config.fold_consecutive {
            fold_consecutive(&records, zone)
        } else {
            unfolded(&records)
        }
    }

    async fn render_batch(&mut self) -> Option<BatchReport> {
        let report = {
            let mut page = self.page.write().await;
            self.renderer.render_next(&mut page)?
        };
        for (id, key) in &report.lazy {
            self.loader.observe(*id, key);
        }
        Some(report)
    }

    /// Handle one visibility signal.
    pub async fn handle(&mut self, event: Visibility) -> Handled {
        if self.unloaded {
            return Handled::Ignored;
        }

        match event {
            Visibility::Sentinel => match self.render_batch().await {
                Some(report) => Handled::Batch(report),
                None => Handled::Ignored,
            },
            Visibility::Image(id) => match self.loader.on_visible(id, self.page.clone()) {
                Some(load) => {
                    self.tasks.spawn(async move { (id, load.await) });
                    Handled::ImageQueued(id)
                }
                None => Handled::Ignored,
            },
            Visibility::Unload => {
                self.unloaded = true;
                self.loader.reset();
                self.page.write().await.clear();
                debug!("Page unloaded with {} image loads in flight", self.tasks.len());
                Handled::Unloaded
            }
        }
    }

    /// Consume queued signals until the page unloads.
    /// Returns the number of signals handled.
    pub async fn run(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events_rx.recv().await {
            handled += 1;
            if self.handle(event).await == Handled::Unloaded {
                break;
            }
        }
        handled
    }

    /// Wait for the next spawned image load to finish. None when nothing
    /// is in flight.
    pub async fn next_settled(&mut self) -> Option<(CardId, ImageOutcome)> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => return Some(outcome),
                Err(e) => error!("Image load task failed: {}", e),
            }
        }
        None
    }

    /// Wait for every spawned image load to finish.
    pub async fn settle(&mut self) -> Vec<(CardId, ImageOutcome)> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(outcome) = self.next_settled().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// True once every card is on the page.
    pub fn is_complete(&self) -> bool {
        self.renderer.state() == BatchState::Complete
    }
}

/// Decode the feed payload. Anything but an array is fatal.
pub fn parse_records(value: Value) -> Result<Vec<DetectionRecord>, LoadError> {
    if !value.is_array() {
        return Err(LoadError::NotAnArray);
    }
    serde_json::from_value(value).map_err(|e| LoadError::Malformed(e.to_string()))
}
