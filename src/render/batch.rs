//! Incremental rendering of detections, one fixed-size page per
//! "need more" signal.

use tracing::{debug, info};

use super::card::{Card, CardOptions};
use super::page::{CardId, Page};
use crate::models::Detection;

pub const DEFAULT_PAGE_SIZE: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Rendering,
    Complete,
}

/// What one batch put on the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Every card appended by this batch, in order.
    pub cards: Vec<CardId>,
    /// Cards waiting for a lazy image lookup, with their species key.
    pub lazy: Vec<(CardId, String)>,
    /// Cards marked missing at once because they have no species key.
    pub missing: Vec<CardId>,
    /// Cursor after the batch.
    pub rendered: usize,
    pub total: usize,
}

impl BatchReport {
    pub fn is_last(&self) -> bool {
        self.rendered == self.total
    }
}

/// Owns the ordered detections and the render cursor.
///
/// The cursor only moves forward and never passes the number of detections.
#[derive(Debug)]
pub struct BatchRenderer {
    detections: Vec<Detection>,
    cursor: usize,
    state: BatchState,
    page_size: usize,
    options: CardOptions,
    site_title: String,
    record_count: usize,
}

impl BatchRenderer {
    pub fn new(page_size: usize, options: CardOptions, site_title: impl Into<String>) -> Self {
        Self {
            detections: Vec::new(),
            cursor: 0,
            state: BatchState::Complete,
            page_size: page_size.max(1),
            options,
            site_title: site_title.into(),
            record_count: 0,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.detections.len()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Final status line, e.g. `Les oiseaux de Palaiseau - 120 détections.`
    pub fn summary(&self) -> String {
        format!("{} - {} détections.", self.site_title, self.record_count)
    }

    fn progress(&self) -> String {
        format!("{} / {}", self.cursor, self.total())
    }

    /// Start over with a new set of detections. `record_count` is the number
    /// of raw records they were built from, shown in the summary.
    pub fn reset(&mut self, detections: Vec<Detection>, record_count: usize, page: &mut Page) {
        self.detections = detections;
        self.record_count = record_count;
        self.cursor = 0;

        if self.detections.is_empty() {
            self.state = BatchState::Complete;
            page.remove_sentinel();
            page.set_status(self.summary());
        } else {
            self.state = BatchState::Idle;
            page.insert_sentinel();
            page.set_status(self.progress());
        }
    }

    /// Drop every detection and stop answering batch signals. The status
    /// line is left to the caller.
    pub fn abort(&mut self, page: &mut Page) {
        self.detections.clear();
        self.record_count = 0;
        self.cursor = 0;
        self.state = BatchState::Complete;
        page.remove_sentinel();
    }

    /// Render the next page of cards. Returns None unless the renderer is
    /// idle with detections left.
    pub fn render_next(&mut self, page: &mut Page) -> Option<BatchReport> {
        if self.state != BatchState::Idle {
            debug!("Batch signal ignored in state {:?}", self.state);
            return None;
        }
        if self.cursor >= self.total() {
            self.complete(page);
            return None;
        }

        self.state = BatchState::Rendering;

        let end = (self.cursor + self.page_size).min(self.total());
        let cards: Vec<Card> = self.detections[self.cursor..end]
            .iter()
            .map(|d| Card::build(d, &self.options))
            .collect();
        let ids = page.append_batch(cards);

        let mut report = BatchReport {
            cards: ids.clone(),
            ..Default::default()
        };
        for id in ids {
            let key = page
                .card(id)
                .map(|c| c.image.species_key.clone())
                .unwrap_or_default();
            if key.is_empty() {
                page.mark_missing(id);
                report.missing.push(id);
            } else {
                report.lazy.push((id, key));
            }
        }

        self.cursor = end;
        report.rendered = self.cursor;
        report.total = self.total();

        if self.cursor >= self.total() {
            self.complete(page);
        } else {
            self.state = BatchState::Idle;
            page.set_status(self.progress());
        }

        debug!(
            "Rendered batch of {} cards ({} / {})",
            report.cards.len(),
            report.rendered,
            report.total
        );
        Some(report)
    }

    fn complete(&mut self, page: &mut Page) {
        self.state = BatchState::Complete;
        page.remove_sentinel();
        page.set_status(self.summary());
        info!("All {} cards rendered", self.total());
    }
}
