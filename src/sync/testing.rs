// Scripted collaborators for unit tests
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use image::RgbaImage;

use crate::detect::{BoundingBox, DetectMode, Detection, Detector};
use crate::error::{DetectionError, PlaybackError};
use crate::playback::{OverlayId, Playback};

use super::transform::ScreenRect;

/// In-memory player recording every request
#[derive(Default)]
pub struct FakePlayer {
    pub frame_size: (u32, u32),
    pub created: Vec<ScreenRect>,
    pub image_sizes: Vec<(u32, u32)>,
    pub removed: Vec<OverlayId>,
    pub live: Vec<OverlayId>,
    pub captures: usize,
    pub next_id: OverlayId,
    pub generation: u64,
    pub fail_captures: bool,
    pub fail_creates: bool,
    pub fail_removes: bool,
    /// Simulate a seek landing while the tick is in flight
    pub seek_during_capture: bool,
}

impl FakePlayer {
    pub fn new() -> Self {
        Self {
            frame_size: (1920, 1080),
            ..Self::default()
        }
    }
}

impl Playback for FakePlayer {
    fn capture_frame(&mut self) -> Result<RgbaImage, PlaybackError> {
        self.captures += 1;
        if self.seek_during_capture {
            self.generation += 1;
        }
        if self.fail_captures {
            return Err(PlaybackError::NoFrame);
        }
        Ok(RgbaImage::new(self.frame_size.0, self.frame_size.1))
    }

    fn create_overlay(&mut self, rect: ScreenRect, image: &RgbaImage) -> Result<OverlayId, PlaybackError> {
        if self.fail_creates {
            return Err(PlaybackError::OverlayTableFull(64));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.created.push(rect);
        self.image_sizes.push(image.dimensions());
        self.live.push(id);
        Ok(id)
    }

    fn remove_overlay(&mut self, id: OverlayId) -> Result<(), PlaybackError> {
        assert!(
            !self.removed.contains(&id),
            "overlay {id} removed twice"
        );
        self.removed.push(id);
        self.live.retain(|&live| live != id);
        if self.fail_removes {
            return Err(PlaybackError::UnknownOverlay(id));
        }
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

/// Detector replaying queued responses; empty results once drained
#[derive(Default)]
pub struct ScriptedDetector {
    pub responses: VecDeque<Result<Vec<Detection>, DetectionError>>,
    pub calls: usize,
    pub labels: Vec<String>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(mut self, detections: Vec<Detection>) -> Self {
        self.responses.push_back(Ok(detections));
        self
    }

    pub fn then_err(mut self) -> Self {
        self.responses.push_back(Err(DetectionError::Exited {
            code: Some(1),
            stderr: "model crashed".to_string(),
        }));
        self
    }
}

impl Detector for ScriptedDetector {
    fn detect(
        &mut self,
        _frame: &RgbaImage,
        _mode: DetectMode,
    ) -> Result<Vec<Detection>, DetectionError> {
        self.calls += 1;
        self.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn available_labels(&self) -> Result<Vec<String>, DetectionError> {
        Ok(self.labels.clone())
    }
}

pub fn detection(label: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> Detection {
    Detection {
        label: label.to_string(),
        bbox: BoundingBox::new(x1, y1, x2, y2),
        confidence: Some(0.9),
    }
}

/// Log output shared between a test and the subscriber writing to it
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a plain-text subscriber installed and return what it logged
pub fn capture_logs(f: impl FnOnce()) -> String {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}
