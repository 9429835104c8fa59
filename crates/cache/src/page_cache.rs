//! Page bitmap cache with distance-from-viewport eviction
//!
//! Holds at most `max_entries` decoded pages. When an insertion pushes the
//! cache over its bound, the pages farthest from the current viewport position
//! are evicted first; among equally distant pages the one inserted earliest
//! goes first.

use log::debug;
use parking_lot::Mutex;
use pdf_reader_render::Bitmap;
use std::collections::HashMap;
use std::sync::Arc;

/// Default number of decoded pages kept around.
pub const DEFAULT_MAX_CACHED_PAGES: usize = 5;

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of pages currently in cache
    pub entries: usize,

    /// Maximum number of pages allowed
    pub max_entries: usize,

    /// Number of insertions, replacements included
    pub inserts: u64,

    /// Number of pages evicted to stay within the bound
    pub evictions: u64,
}

struct CacheEntry {
    bitmap: Bitmap,
    /// Insertion sequence number, used as the eviction tie-break.
    inserted: u64,
    /// Distance to the viewport when the entry was written.
    viewport_distance: u32,
}

/// Internal cache state
struct CacheState {
    entries: HashMap<u32, CacheEntry>,
    max_entries: usize,
    next_sequence: u64,
    last_viewport: u32,
    stats: CacheStats,
}

impl CacheState {
    fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: HashMap::new(),
            max_entries,
            next_sequence: 0,
            last_viewport: 0,
            stats: CacheStats { max_entries, ..Default::default() },
        }
    }

    /// Page that should go first: farthest from `viewport`, earliest inserted
    /// on ties.
    fn eviction_candidate(&self, viewport: u32) -> Option<u32> {
        self.entries
            .iter()
            .max_by(|(a_page, a), (b_page, b)| {
                a_page
                    .abs_diff(viewport)
                    .cmp(&b_page.abs_diff(viewport))
                    .then_with(|| b.inserted.cmp(&a.inserted))
            })
            .map(|(page, _)| *page)
    }

    /// Evict until the bound holds. Evicted bitmaps are dropped here; any
    /// slot still showing one keeps its own reference.
    fn evict_to_fit(&mut self, viewport: u32) -> Vec<u32> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.max_entries {
            let Some(page) = self.eviction_candidate(viewport) else {
                break;
            };
            if let Some(entry) = self.entries.remove(&page) {
                debug!(
                    "evicted page {page} (distance {} from viewport {viewport}, {} bytes)",
                    page.abs_diff(viewport),
                    entry.bitmap.memory_size()
                );
            }
            self.stats.evictions += 1;
            evicted.push(page);
        }
        self.stats.entries = self.entries.len();
        evicted
    }
}

/// Bounded page cache shared between the render scheduler and the page list.
///
/// Cloning yields another handle to the same cache. All mutation happens under
/// one lock, so a lookup sees either no entry or a complete bitmap.
///
/// # Example
///
/// ```
/// use pdf_reader_cache::PageCache;
/// use pdf_reader_render::{Bitmap, RgbaImage};
///
/// let cache = PageCache::new(2);
/// for page in 0..4 {
///     cache.put(page, Bitmap::new(page, RgbaImage::new(8, 8)), 3);
/// }
///
/// assert_eq!(cache.pages(), vec![2, 3]);
/// ```
#[derive(Clone)]
pub struct PageCache {
    state: Arc<Mutex<CacheState>>,
}

impl PageCache {
    /// Create a cache holding at most `max_entries` pages (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self { state: Arc::new(Mutex::new(CacheState::new(max_entries))) }
    }

    /// Look up a page. Pure: no statistics, no reordering.
    pub fn get(&self, page_index: u32) -> Option<Bitmap> {
        self.state.lock().entries.get(&page_index).map(|entry| entry.bitmap.clone())
    }

    /// Store a page and evict down to the bound relative to `viewport`.
    ///
    /// Replacing an existing page counts as a fresh insertion. Returns the
    /// evicted page indices, which may include `page_index` itself when it is
    /// the farthest page.
    pub fn put(&self, page_index: u32, bitmap: Bitmap, viewport: u32) -> Vec<u32> {
        let mut state = self.state.lock();

        let inserted = state.next_sequence;
        state.next_sequence += 1;
        state.last_viewport = viewport;
        state.entries.insert(
            page_index,
            CacheEntry { bitmap, inserted, viewport_distance: page_index.abs_diff(viewport) },
        );
        state.stats.inserts += 1;
        debug!("cached page {page_index} (viewport {viewport})");

        state.evict_to_fit(viewport)
    }

    pub fn contains(&self, page_index: u32) -> bool {
        self.state.lock().entries.contains_key(&page_index)
    }

    pub fn remove(&self, page_index: u32) -> Option<Bitmap> {
        let mut state = self.state.lock();
        let removed = state.entries.remove(&page_index).map(|entry| entry.bitmap);
        state.stats.entries = state.entries.len();
        removed
    }

    /// Drop every cached page.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let released = state.entries.len();
        state.entries.clear();
        state.stats.entries = 0;
        if released > 0 {
            debug!("cleared {released} cached pages");
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Cached page indices in ascending order.
    pub fn pages(&self) -> Vec<u32> {
        let state = self.state.lock();
        let mut pages: Vec<u32> = state.entries.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    /// Distance from the viewport recorded when `page_index` was stored.
    pub fn viewport_distance(&self, page_index: u32) -> Option<u32> {
        self.state.lock().entries.get(&page_index).map(|entry| entry.viewport_distance)
    }

    pub fn max_entries(&self) -> usize {
        self.state.lock().max_entries
    }

    /// Change the bound, evicting immediately against the last viewport seen.
    pub fn set_max_entries(&self, max_entries: usize) -> Vec<u32> {
        let mut state = self.state.lock();
        state.max_entries = max_entries.max(1);
        state.stats.max_entries = state.max_entries;
        let viewport = state.last_viewport;
        state.evict_to_fit(viewport)
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHED_PAGES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_reader_render::RgbaImage;
    use rand::Rng;
    use std::thread;

    fn bitmap(page: u32) -> Bitmap {
        Bitmap::new(page, RgbaImage::new(4, 4))
    }

    #[test]
    fn test_put_get() {
        let cache = PageCache::new(3);
        cache.put(1, bitmap(1), 1);

        let hit = cache.get(1).expect("page should be cached");
        assert_eq!(hit.page_index(), 1);
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn test_get_is_idempotent() {
        let cache = PageCache::new(3);
        cache.put(4, bitmap(4), 4);

        let first = cache.get(4).unwrap();
        let second = cache.get(4).unwrap();
        let third = cache.get(4).unwrap();

        assert!(first.ptr_eq(&second));
        assert!(second.ptr_eq(&third));
        assert_eq!(cache.stats().inserts, 1);
    }

    #[test]
    fn test_evicts_farthest_from_viewport() {
        let cache = PageCache::new(3);
        cache.put(0, bitmap(0), 5);
        cache.put(9, bitmap(9), 5);
        cache.put(4, bitmap(4), 5);

        let evicted = cache.put(6, bitmap(6), 5);

        assert_eq!(evicted, vec![0]);
        assert_eq!(cache.pages(), vec![4, 6, 9]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_tie_breaks_by_insertion_order() {
        let cache = PageCache::new(2);
        cache.put(7, bitmap(7), 5);
        cache.put(3, bitmap(3), 5);

        // 3 and 7 are both two pages away; 7 went in first.
        let evicted = cache.put(5, bitmap(5), 5);

        assert_eq!(evicted, vec![7]);
        assert_eq!(cache.pages(), vec![3, 5]);
    }

    #[test]
    fn test_replacement_counts_as_fresh_insertion() {
        let cache = PageCache::new(2);
        cache.put(3, bitmap(3), 5);
        cache.put(7, bitmap(7), 5);
        cache.put(3, bitmap(3), 5);

        let evicted = cache.put(5, bitmap(5), 5);

        assert_eq!(evicted, vec![7]);
        assert_eq!(cache.pages(), vec![3, 5]);
    }

    #[test]
    fn test_new_page_evicted_when_farthest() {
        let cache = PageCache::new(1);
        cache.put(10, bitmap(10), 0);

        let evicted = cache.put(20, bitmap(20), 0);

        assert_eq!(evicted, vec![20]);
        assert_eq!(cache.pages(), vec![10]);
    }

    #[test]
    fn test_sequential_scroll_keeps_nearest_pages() {
        let cache = PageCache::new(2);
        for page in 0..5 {
            cache.put(page, bitmap(page), page);
        }

        assert_eq!(cache.pages(), vec![3, 4]);
        assert_eq!(cache.viewport_distance(3), Some(0));
    }

    #[test]
    fn test_evicted_bitmap_survives_while_referenced() {
        let cache = PageCache::new(1);
        cache.put(0, bitmap(0), 0);
        let shown = cache.get(0).unwrap();

        cache.put(1, bitmap(1), 1);

        assert!(!cache.contains(0));
        assert_eq!(shown.page_index(), 0);
        assert_eq!(shown.width(), 4);
    }

    #[test]
    fn test_clear_and_remove() {
        let cache = PageCache::new(4);
        cache.put(1, bitmap(1), 1);
        cache.put(2, bitmap(2), 1);
        cache.put(3, bitmap(3), 1);

        assert!(cache.remove(2).is_some());
        assert!(cache.remove(2).is_none());
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_set_max_entries_shrinks() {
        let cache = PageCache::new(4);
        for page in 0..4 {
            cache.put(page, bitmap(page), 0);
        }

        let evicted = cache.set_max_entries(2);

        assert_eq!(evicted, vec![3, 2]);
        assert_eq!(cache.pages(), vec![0, 1]);
        assert_eq!(cache.max_entries(), 2);
    }

    #[test]
    fn test_zero_bound_is_clamped() {
        let cache = PageCache::new(0);
        cache.put(1, bitmap(1), 1);
        assert_eq!(cache.max_entries(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_random_puts_respect_bound_and_distance() {
        let mut rng = rand::thread_rng();
        let cache = PageCache::new(5);

        for _ in 0..500 {
            let page = rng.gen_range(0..40);
            let viewport = rng.gen_range(0..40);
            let evicted = cache.put(page, bitmap(page), viewport);

            assert!(cache.len() <= 5);
            let remaining = cache.pages();
            for gone in &evicted {
                for kept in &remaining {
                    assert!(
                        kept.abs_diff(viewport) <= gone.abs_diff(viewport),
                        "kept page {kept} is farther from {viewport} than evicted page {gone}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_concurrent_puts_respect_bound() {
        let cache = PageCache::new(3);
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for page in 0..50u32 {
                        let page = page * 4 + worker;
                        cache.put(page, bitmap(page), page);
                        assert!(cache.len() <= 3);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().inserts, 200);
    }
}
