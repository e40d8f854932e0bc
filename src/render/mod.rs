//! Headless rendering of detection cards.
//!
//! A [`Page`] stands in for the document: a status line, a container of
//! cards and a sentinel. [`BatchRenderer`] fills it a page at a time and
//! [`html`] snapshots it as static HTML.

mod batch;
mod card;
pub mod html;
mod page;

pub use batch::{BatchRenderer, BatchReport, BatchState, DEFAULT_PAGE_SIZE};
pub use card::{Card, CardOptions};
pub use page::{CardElement, CardId, ImageElement, ImageState, Page, PageHandle};
