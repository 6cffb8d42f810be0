// On-screen display layout for a video fitted into a fixed window
use crate::sync::{GeometryField, PlayerEvent};

/// Where the video lands inside the OSD.
///
/// The video is scaled to fit while keeping its aspect ratio and centred;
/// the leftover space becomes symmetric letterbox (top/bottom) or pillarbox
/// (left/right) margins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OsdLayout {
    pub osd_width: u32,
    pub osd_height: u32,
    pub margin_top: u32,
    pub margin_left: u32,
    pub video_width: u32,
    pub video_height: u32,
}

impl OsdLayout {
    pub fn fit(video_width: u32, video_height: u32, osd_width: u32, osd_height: u32) -> Self {
        let (mut margin_top, mut margin_left) = (0, 0);

        if video_width > 0 && video_height > 0 {
            let video_aspect = video_width as f64 / video_height as f64;
            let osd_aspect = osd_width as f64 / osd_height.max(1) as f64;

            if video_aspect > osd_aspect {
                let content_h = (osd_width as f64 / video_aspect).round() as u32;
                margin_top = osd_height.saturating_sub(content_h) / 2;
            } else {
                let content_w = (osd_height as f64 * video_aspect).round() as u32;
                margin_left = osd_width.saturating_sub(content_w) / 2;
            }
        }

        Self {
            osd_width,
            osd_height,
            margin_top,
            margin_left,
            video_width,
            video_height,
        }
    }

    /// Size of the area the video is drawn into
    pub fn content_size(&self) -> (u32, u32) {
        (
            self.osd_width.saturating_sub(2 * self.margin_left),
            self.osd_height.saturating_sub(2 * self.margin_top),
        )
    }

    /// Property updates announcing this layout
    pub fn geometry_events(&self) -> Vec<PlayerEvent> {
        GeometryField::ALL
            .into_iter()
            .map(|field| {
                let value = match field {
                    GeometryField::OsdMarginTop => self.margin_top,
                    GeometryField::OsdMarginLeft => self.margin_left,
                    GeometryField::OsdWidth => self.osd_width,
                    GeometryField::OsdHeight => self.osd_height,
                    GeometryField::VideoWidth => self.video_width,
                    GeometryField::VideoHeight => self.video_height,
                };
                PlayerEvent::GeometryUpdated {
                    field,
                    value: Some(f64::from(value)),
                }
            })
            .collect()
    }
}
