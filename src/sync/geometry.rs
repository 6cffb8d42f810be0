// Latest known player/video geometry
use crate::error::{CensorError, CensorResult};

use super::events::GeometryField;

/// A complete set of geometry values, safe to hand to the transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometrySnapshot {
    pub osd_margin_top: f64,
    pub osd_margin_left: f64,
    pub osd_width: f64,
    pub osd_height: f64,
    pub video_width: f64,
    pub video_height: f64,
}

/// Geometry values as they arrive from property updates.
///
/// Fields are independent and may be set in any order.
#[derive(Debug, Clone, Default)]
pub struct GeometryStore {
    values: [Option<f64>; 6],
}

impl GeometryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a field
    pub fn set(&mut self, field: GeometryField, value: f64) {
        self.values[field.index()] = Some(value);
    }

    /// Forget a field (the property became unavailable)
    pub fn unset(&mut self, field: GeometryField) {
        self.values[field.index()] = None;
    }

    /// Apply a property update as delivered by the player
    pub fn apply(&mut self, field: GeometryField, value: Option<f64>) {
        match value {
            Some(v) => self.set(field, v),
            None => self.unset(field),
        }
    }

    pub fn get(&self, field: GeometryField) -> Option<f64> {
        self.values[field.index()]
    }

    /// Current snapshot, or `IncompleteGeometry` listing what is missing.
    ///
    /// Non-positive video dimensions count as missing: the player reports
    /// zero while a file is still loading.
    pub fn snapshot(&self) -> CensorResult<GeometrySnapshot> {
        let missing: Vec<GeometryField> = GeometryField::ALL
            .into_iter()
            .filter(|&field| match self.get(field) {
                None => true,
                Some(v) => {
                    matches!(field, GeometryField::VideoWidth | GeometryField::VideoHeight)
                        && v <= 0.0
                }
            })
            .collect();

        if !missing.is_empty() {
            return Err(CensorError::IncompleteGeometry { missing });
        }

        let v = |field: GeometryField| self.values[field.index()].unwrap_or_default();
        Ok(GeometrySnapshot {
            osd_margin_top: v(GeometryField::OsdMarginTop),
            osd_margin_left: v(GeometryField::OsdMarginLeft),
            osd_width: v(GeometryField::OsdWidth),
            osd_height: v(GeometryField::OsdHeight),
            video_width: v(GeometryField::VideoWidth),
            video_height: v(GeometryField::VideoHeight),
        })
    }

    #[cfg(test)]
    pub fn is_complete(&self) -> bool {
        self.snapshot().is_ok()
    }
}
