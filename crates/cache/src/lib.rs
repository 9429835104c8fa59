//! PDF Reader Cache Library
//!
//! Bounded page bitmap cache with distance-from-viewport eviction.

pub mod page_cache;

pub use page_cache::{CacheStats, PageCache, DEFAULT_MAX_CACHED_PAGES};
