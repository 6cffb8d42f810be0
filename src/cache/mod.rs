// Cache module - reusable overlay images
mod overlay_cache;

pub use overlay_cache::OverlayImageCache;
