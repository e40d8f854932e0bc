//! Illustration lookup, memoization and lazy loading.

pub mod cache;
pub mod loader;
pub mod resolver;

pub use cache::{ImageCache, SharedLookup};
pub use loader::{ImageLoader, ImageOutcome};
pub use resolver::{FeedImage, ImageLookup, ImageResolver, ResolverConfig, SummaryImage};
