// Detection module - the model boundary
// Contains: detection types, the detector trait, the external-command backend

mod command;

pub use command::CommandDetector;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::DetectionError;

/// Axis-aligned box in source-frame (video) pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Clamp the box into `[0, width] x [0, height]`.
    ///
    /// Returns `None` for inverted boxes, non-finite coordinates, and boxes
    /// left without area once clamped.
    pub fn clamp_to(&self, width: f64, height: f64) -> Option<BoundingBox> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return None;
        }
        if self.x2 < self.x1 || self.y2 < self.y1 {
            return None;
        }

        let clamped = BoundingBox {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
        };

        if clamped.x2 > clamped.x1 && clamped.y2 > clamped.y1 {
            Some(clamped)
        } else {
            None
        }
    }
}

/// One labeled region reported by the detector
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: Option<f32>,
}

/// Speed/accuracy trade-off requested from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectMode {
    #[default]
    Fast,
    Default,
}

impl DetectMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectMode::Fast => "fast",
            DetectMode::Default => "default",
        }
    }
}

/// Object detection backend.
///
/// Consumes one captured frame and returns labeled boxes in that frame's
/// pixel space.
pub trait Detector {
    fn detect(
        &mut self,
        frame: &RgbaImage,
        mode: DetectMode,
    ) -> Result<Vec<Detection>, DetectionError>;

    /// Labels the model can emit
    fn available_labels(&self) -> Result<Vec<String>, DetectionError>;
}
