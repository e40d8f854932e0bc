//! Lazy, fire-once image loading for rendered cards.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use super::cache::{ImageCache, SharedLookup};
use crate::fetch::ImageProbe;
use crate::render::{CardId, ImageState, PageHandle};

/// How a card's image load ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    Ready,
    Missing,
    /// The card left the document before the load finished.
    Detached,
}

/// Tracks which cards still wait to become visible.
pub struct ImageLoader {
    cache: ImageCache,
    probe: Arc<dyn ImageProbe>,
    observed: HashMap<CardId, String>,
}

impl ImageLoader {
    pub fn new(cache: ImageCache, probe: Arc<dyn ImageProbe>) -> Self {
        Self {
            cache,
            probe,
            observed: HashMap::new(),
        }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    /// Register interest in a card's visibility. Cards without a species
    /// key are not observed.
    pub fn observe(&mut self, id: CardId, species_key: &str) -> bool {
        let key = species_key.trim();
        if key.is_empty() {
            return false;
        }
        self.observed.insert(id, key.to_string());
        true
    }

    pub fn is_observing(&self, id: CardId) -> bool {
        self.observed.contains_key(&id)
    }

    /// Number of cards still waiting to become visible.
    pub fn pending(&self) -> usize {
        self.observed.len()
    }

    /// Forget every observed card.
    pub fn reset(&mut self) {
        self.observed.clear();
    }

    /// A card became visible. The first call stops observing it and returns
    /// the load to drive; later calls return None.
    pub fn on_visible(
        &mut self,
        id: CardId,
        page: PageHandle,
    ) -> Option<BoxFuture<'static, ImageOutcome>> {
        let key = self.observed.remove(&id)?;
        let lookup = self.cache.resolve(&key);
        let probe = self.probe.clone();
        Some(load_image(id, lookup, probe, page).boxed())
    }
}

async fn load_image(
    id: CardId,
    lookup: SharedLookup,
    probe: Arc<dyn ImageProbe>,
    page: PageHandle,
) -> ImageOutcome {
    let lookup = lookup.await;
    let url = lookup.url();

    if url.is_empty() {
        return if page.write().await.mark_missing(id) {
            ImageOutcome::Missing
        } else {
            ImageOutcome::Detached
        };
    }

    if !page.write().await.begin_image_load(id, url) {
        debug!("Card {:?} detached before its image arrived", id);
        return ImageOutcome::Detached;
    }

    let (state, outcome) = if probe.load(url).await {
        (ImageState::Ready, ImageOutcome::Ready)
    } else {
        (ImageState::Missing, ImageOutcome::Missing)
    };

    if page.write().await.finish_image(id, state) {
        outcome
    } else {
        ImageOutcome::Detached
    }
}
