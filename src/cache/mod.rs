//! Catalog caching layer
//!
//! In-memory recipe/picture catalog, the local image cache it fills, and the
//! pagination served from it.

pub mod catalog;
pub mod images;
pub mod metadata;
pub mod paging;
pub mod types;

pub use catalog::{Catalog, Phase};
pub use images::{ImageCache, ImageVariant};
pub use metadata::MetadataCache;
pub use paging::{Pager, SlideshowPaging};
pub use types::{CollectionKind, Items};
