// Overlay image cache with LRU eviction
use std::num::NonZeroUsize;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use lru::LruCache;

/// Fill colour of censor overlays: opaque black
const OVERLAY_FILL: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Default number of distinct overlay sizes kept around
const DEFAULT_CAPACITY: usize = 32;

/// Cache of opaque overlay images keyed by size.
/// Detections of the same size on consecutive frames reuse one buffer
/// instead of allocating a fresh image per overlay.
pub struct OverlayImageCache {
    /// LRU cache of rendered blocks ((width, height) -> image)
    cache: LruCache<(u32, u32), Arc<RgbaImage>>,
}

impl OverlayImageCache {
    /// Create a new cache holding at most `max_size` sizes
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Get the overlay image for a size, rendering it if not present
    pub fn get_or_render(&mut self, width: u32, height: u32) -> Arc<RgbaImage> {
        self.cache
            .get_or_insert((width, height), || {
                Arc::new(RgbaImage::from_pixel(width, height, OVERLAY_FILL))
            })
            .clone()
    }

    /// Check if a size is in the cache
    #[cfg(test)]
    pub fn contains(&self, width: u32, height: u32) -> bool {
        self.cache.contains(&(width, height))
    }

    /// Get the number of cached images
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Clear the cache
    #[cfg(test)]
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

impl Default for OverlayImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
