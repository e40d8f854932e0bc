//! View model for one detection card.

use crate::format::{format_instant, format_window, DisplayZone};
use crate::links::{encyclopedia_article_url, DEFAULT_ARTICLE_BASE};
use crate::models::Detection;

/// Presentation settings shared by every card of a session.
#[derive(Debug, Clone)]
pub struct CardOptions {
    pub zone: DisplayZone,
    pub article_base: String,
    pub show_confidence: bool,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            zone: DisplayZone::default(),
            article_base: DEFAULT_ARTICLE_BASE.to_string(),
            show_confidence: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// Date line: one instant or a detection window.
    pub when: String,
    /// Common name, else scientific name.
    pub name: String,
    /// Encyclopedia article for the species, if it has a name.
    pub link: Option<String>,
    pub count: u32,
    /// Rounded percentage, e.g. `87 %`.
    pub confidence: Option<String>,
    pub sci_name: String,
    /// Trimmed scientific name; empty means no illustration lookup.
    pub species_key: String,
}

impl Card {
    pub fn build(detection: &Detection, options: &CardOptions) -> Self {
        let when = match (detection.start.as_deref(), detection.end.as_deref()) {
            (Some(start), Some(end)) if start == end => format_instant(start, options.zone),
            (start, end) => format_window(start, end, options.zone),
        };

        let confidence = detection
            .confidence
            .filter(|_| options.show_confidence)
            .filter(|c| c.is_finite())
            .map(|c| format!("{} %", (c * 100.0).round() as i64));

        Self {
            when,
            name: detection.display_name().to_string(),
            link: encyclopedia_article_url(&options.article_base, &detection.sci_name),
            count: detection.count,
            confidence,
            sci_name: detection.sci_name.trim().to_string(),
            species_key: detection.species_key().to_string(),
        }
    }

    /// `x<n>` badge, only shown for folded runs.
    pub fn count_badge(&self) -> Option<String> {
        (self.count > 1).then(|| format!("x{}", self.count))
    }

    /// Single-line rendering for terminals.
    pub fn to_line(&self) -> String {
        let mut line = format!("{}  {}", self.when, self.name);
        if let Some(badge) = self.count_badge() {
            line.push(' ');
            line.push_str(&badge);
        }
        if let Some(ref confidence) = self.confidence {
            line.push_str(&format!(" ({})", confidence));
        }
        if !self.sci_name.is_empty() && self.sci_name != self.name {
            line.push_str(&format!("  [{}]", self.sci_name));
        }
        line
    }
}
