//! Headless page surface: a status line, a container of cards and the
//! sentinel that asks for more.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::card::Card;

/// Page shared between the renderer and in-flight image loads.
pub type PageHandle = Arc<RwLock<Page>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    /// Placeholder, no URL yet.
    Pending,
    /// URL assigned, image data on its way.
    Loading,
    Ready,
    Missing,
}

impl ImageState {
    /// CSS class used by the HTML snapshot.
    pub fn class(&self) -> &'static str {
        match self {
            ImageState::Pending => "img-pending",
            ImageState::Loading => "img-loading",
            ImageState::Ready => "img-ready",
            ImageState::Missing => "img-missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageElement {
    pub species_key: String,
    pub src: Option<String>,
    pub state: ImageState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardElement {
    pub id: CardId,
    pub card: Card,
    pub image: ImageElement,
    attached: bool,
}

impl CardElement {
    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

#[derive(Debug)]
pub struct Page {
    status: String,
    cards: Vec<CardElement>,
    sentinel: bool,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Self {
            status: "Chargement…".to_string(),
            cards: Vec::new(),
            sentinel: false,
        }
    }

    pub fn into_handle(self) -> PageHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn has_sentinel(&self) -> bool {
        self.sentinel
    }

    pub fn insert_sentinel(&mut self) {
        self.sentinel = true;
    }

    pub fn remove_sentinel(&mut self) {
        self.sentinel = false;
    }

    /// Append cards as one batch. Ids are stable for the page's lifetime.
    pub fn append_batch(&mut self, cards: Vec<Card>) -> Vec<CardId> {
        let mut ids = Vec::with_capacity(cards.len());
        for card in cards {
            let id = CardId(self.cards.len());
            let image = ImageElement {
                species_key: card.species_key.clone(),
                src: None,
                state: ImageState::Pending,
            };
            self.cards.push(CardElement {
                id,
                card,
                image,
                attached: true,
            });
            ids.push(id);
        }
        ids
    }

    pub fn card(&self, id: CardId) -> Option<&CardElement> {
        self.cards.get(id.0)
    }

    /// Cards still in the document, in insertion order.
    pub fn cards(&self) -> impl Iterator<Item = &CardElement> {
        self.cards.iter().filter(|c| c.attached)
    }

    /// Number of attached cards.
    pub fn len(&self) -> usize {
        self.cards().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_attached(&self, id: CardId) -> bool {
        self.card(id).is_some_and(|c| c.attached)
    }

    /// Remove a card from the document. Returns false if it was not attached.
    pub fn detach(&mut self, id: CardId) -> bool {
        match self.cards.get_mut(id.0) {
            Some(card) if card.attached => {
                card.attached = false;
                true
            }
            _ => false,
        }
    }

    /// Detach every card and drop the sentinel.
    pub fn clear(&mut self) {
        for card in &mut self.cards {
            card.attached = false;
        }
        self.sentinel = false;
    }

    fn attached_mut(&mut self, id: CardId) -> Option<&mut CardElement> {
        self.cards.get_mut(id.0).filter(|c| c.attached)
    }

    /// Assign an image URL. Returns false if the card is gone.
    pub fn begin_image_load(&mut self, id: CardId, src: &str) -> bool {
        match self.attached_mut(id) {
            Some(card) => {
                card.image.src = Some(src.to_string());
                card.image.state = ImageState::Loading;
                true
            }
            None => false,
        }
    }

    /// Record the final image state. Returns false if the card is gone.
    pub fn finish_image(&mut self, id: CardId, state: ImageState) -> bool {
        match self.attached_mut(id) {
            Some(card) => {
                card.image.state = state;
                true
            }
            None => false,
        }
    }

    pub fn mark_missing(&mut self, id: CardId) -> bool {
        self.finish_image(id, ImageState::Missing)
    }
}
