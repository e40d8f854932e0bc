//! birdfeed - headless renderer for a feed of bird detections.
//!
//! Fetches a JSON array of detections, folds consecutive sightings of the
//! same species, renders cards a page at a time and resolves an
//! illustration per species from an encyclopedia summary or a public photo
//! feed, looking each species up at most once per session.

pub mod config;
pub mod convert;
pub mod fetch;
pub mod format;
pub mod images;
pub mod links;
pub mod models;
pub mod render;
pub mod session;

pub use config::{Config, Settings};
pub use models::{Detection, DetectionRecord};
pub use session::{Handled, LoadError, Session, SessionConfig, Visibility, VisibilitySender};
