//! Configuration management for birdfeed using the prefer crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::format::DisplayZone;
use crate::images::resolver::{DEFAULT_PHOTO_FEED_URL, DEFAULT_SUMMARY_BASE};
use crate::links::DEFAULT_ARTICLE_BASE;
use crate::render::DEFAULT_PAGE_SIZE;
use crate::session::{DEFAULT_DATA_URL, DEFAULT_SITE_TITLE};

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// URL of the detection feed (a JSON array).
    pub data_url: String,
    /// Cards per batch.
    pub page_size: usize,
    /// Title used in the final status line.
    pub site_title: String,
    /// User agent for HTTP requests (None = built-in default).
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Upper bound for each illustration lookup stage, in milliseconds.
    pub lookup_timeout_ms: u64,
    /// Encyclopedia summary endpoint, species slug appended.
    pub summary_base: String,
    /// Public photo feed endpoint.
    pub photo_feed_url: String,
    /// Encyclopedia article base for card links.
    pub article_base: String,
    pub sort_descending: bool,
    pub fold_consecutive: bool,
    pub show_confidence: bool,
    /// Display offset in minutes east of UTC (None = host local zone).
    pub utc_offset_minutes: Option<i32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_url: DEFAULT_DATA_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            site_title: DEFAULT_SITE_TITLE.to_string(),
            user_agent: None,
            request_timeout: 30,
            lookup_timeout_ms: 8_000,
            summary_base: DEFAULT_SUMMARY_BASE.to_string(),
            photo_feed_url: DEFAULT_PHOTO_FEED_URL.to_string(),
            article_base: DEFAULT_ARTICLE_BASE.to_string(),
            sort_descending: true,
            fold_consecutive: true,
            show_confidence: true,
            utc_offset_minutes: None,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Zone for reading and displaying timestamps. An out-of-range offset
    /// falls back to the host zone.
    pub fn display_zone(&self) -> DisplayZone {
        self.utc_offset_minutes
            .and_then(DisplayZone::from_offset_minutes)
            .unwrap_or_default()
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub site_title: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub lookup_timeout_ms: Option<u64>,
    #[serde(default)]
    pub summary_base: Option<String>,
    #[serde(default)]
    pub photo_feed_url: Option<String>,
    #[serde(default)]
    pub article_base: Option<String>,
    #[serde(default)]
    pub sort_descending: Option<bool>,
    #[serde(default)]
    pub fold_consecutive: Option<bool>,
    #[serde(default)]
    pub show_confidence: Option<bool>,
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers birdfeed config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("birdfeed").await {
            Ok(pref_config) => Config {
                data_url: pref_config.get("data_url").ok(),
                page_size: pref_config.get("page_size").ok(),
                site_title: pref_config.get("site_title").ok(),
                user_agent: pref_config.get("user_agent").ok(),
                request_timeout: pref_config.get("request_timeout").ok(),
                lookup_timeout_ms: pref_config.get("lookup_timeout_ms").ok(),
                summary_base: pref_config.get("summary_base").ok(),
                photo_feed_url: pref_config.get("photo_feed_url").ok(),
                article_base: pref_config.get("article_base").ok(),
                sort_descending: pref_config.get("sort_descending").ok(),
                fold_consecutive: pref_config.get("fold_consecutive").ok(),
                show_confidence: pref_config.get("show_confidence").ok(),
                utc_offset_minutes: pref_config.get("utc_offset_minutes").ok(),
            },
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref url) = self.data_url {
            settings.data_url = url.clone();
        }
        if let Some(size) = self.page_size {
            settings.page_size = size.max(1);
        }
        if let Some(ref title) = self.site_title {
            settings.site_title = title.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(timeout) = self.lookup_timeout_ms {
            settings.lookup_timeout_ms = timeout;
        }
        if let Some(ref base) = self.summary_base {
            settings.summary_base = base.clone();
        }
        if let Some(ref url) = self.photo_feed_url {
            settings.photo_feed_url = url.clone();
        }
        if let Some(ref base) = self.article_base {
            settings.article_base = base.clone();
        }
        if let Some(sort) = self.sort_descending {
            settings.sort_descending = sort;
        }
        if let Some(fold) = self.fold_consecutive {
            settings.fold_consecutive = fold;
        }
        if let Some(show) = self.show_confidence {
            settings.show_confidence = show;
        }
        if let Some(offset) = self.utc_offset_minutes {
            settings.utc_offset_minutes = Some(offset);
        }
    }
}

/// Load settings from configuration (async version).
pub async fn load_settings() -> Settings {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings
}
