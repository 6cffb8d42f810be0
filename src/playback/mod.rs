// Playback module - the media engine boundary
// Contains: the playback trait, OSD layout, keyboard controls, the headless ffmpeg player

mod control;
mod layout;
mod player;

pub use control::spawn_stdin_controls;
pub use player::{PlayerOptions, VideoPlayer};

use image::RgbaImage;

use crate::error::PlaybackError;
use crate::sync::ScreenRect;

/// Identifier the engine assigns to a live overlay
pub type OverlayId = u32;

/// Operations the processing context needs from the media engine.
pub trait Playback {
    /// Grab the frame currently on screen, at native video resolution
    fn capture_frame(&mut self) -> Result<RgbaImage, PlaybackError>;

    /// Composite `image` over the video output at `rect`
    fn create_overlay(&mut self, rect: ScreenRect, image: &RgbaImage) -> Result<OverlayId, PlaybackError>;

    fn remove_overlay(&mut self, id: OverlayId) -> Result<(), PlaybackError>;

    /// Counter bumped whenever playback seeks or stops.
    ///
    /// Work started under one generation is stale under the next.
    fn generation(&self) -> u64 {
        0
    }
}
