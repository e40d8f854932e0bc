//! Per-session memo of illustration lookups, keyed by species.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use tracing::debug;

use super::resolver::{ImageLookup, ImageResolver};

/// A lookup shared by every card showing the same species.
pub type SharedLookup = Shared<BoxFuture<'static, ImageLookup>>;

/// Maps trimmed species names to one pending-or-settled lookup each.
///
/// An entry is stored before its lookup settles, so later callers join the
/// lookup in flight instead of starting another one. Failed lookups stay
/// cached as [`ImageLookup::NotFound`] for the rest of the session.
#[derive(Clone)]
pub struct ImageCache {
    resolver: ImageResolver,
    entries: Arc<Mutex<HashMap<String, SharedLookup>>>,
}

impl ImageCache {
    pub fn new(resolver: ImageResolver) -> Self {
        Self {
            resolver,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, SharedLookup>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the lookup for a species, starting it on first request.
    pub fn resolve(&self, name: &str) -> SharedLookup {
        let key = name.trim();
        if key.is_empty() {
            return future::ready(ImageLookup::NotFound).boxed().shared();
        }

        let mut entries = self.entries();
        if let Some(existing) = entries.get(key) {
            debug!("Image cache hit for {}", key);
            return existing.clone();
        }

        debug!("Image cache miss for {}", key);
        let resolver = self.resolver.clone();
        let owned = key.to_string();
        let lookup = async move { resolver.resolve(&owned).await }
            .boxed()
            .shared();
        entries.insert(key.to_string(), lookup.clone());
        lookup
    }

    /// Settled URL for a species, if its lookup already finished.
    pub fn peek(&self, name: &str) -> Option<ImageLookup> {
        self.entries().get(name.trim()).and_then(|f| f.peek().cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries().contains_key(name.trim())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
