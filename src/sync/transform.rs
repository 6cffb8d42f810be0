// Detection-space to on-screen coordinate mapping
use crate::detect::BoundingBox;
use crate::error::{CensorError, CensorResult};

use super::geometry::GeometrySnapshot;

/// Integer rectangle in on-screen display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the rectangle covers at least one pixel
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Map a video-space box onto the on-screen display.
///
/// The video content occupies the OSD minus a symmetric margin on each
/// side. Results are truncated toward zero.
pub fn map(bbox: &BoundingBox, geometry: &GeometrySnapshot) -> CensorResult<ScreenRect> {
    if geometry.video_width == 0.0 || geometry.video_height == 0.0 {
        return Err(CensorError::InvalidGeometry {
            width: geometry.video_width,
            height: geometry.video_height,
        });
    }

    let content_w = geometry.osd_width - 2.0 * geometry.osd_margin_left;
    let content_h = geometry.osd_height - 2.0 * geometry.osd_margin_top;

    // Multiply before dividing so ratios like 960 * 800 / 1920 stay exact
    let sx = |v: f64| v * content_w / geometry.video_width;
    let sy = |v: f64| v * content_h / geometry.video_height;

    Ok(ScreenRect::new(
        (sx(bbox.x1) + geometry.osd_margin_left) as i32,
        (sy(bbox.y1) + geometry.osd_margin_top) as i32,
        sx(bbox.x2 - bbox.x1) as i32,
        sy(bbox.y2 - bbox.y1) as i32,
    ))
}
