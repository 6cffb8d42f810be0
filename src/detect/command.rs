// Detector backed by an external model program
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use image::RgbaImage;
use serde::Deserialize;
use tempfile::TempDir;
use tracing::debug;

use super::{BoundingBox, DetectMode, Detection, Detector};
use crate::error::DetectionError;

/// Detection record as printed by the model program
#[derive(Debug, Deserialize)]
struct RawDetection {
    label: String,
    #[serde(rename = "box")]
    bbox: [f64; 4],
    #[serde(default, alias = "confidence")]
    score: Option<f32>,
}

/// Runs a detector program once per frame.
///
/// Protocol:
/// - `<program> detect --model M --mode MODE <frame.png>` prints a JSON
///   array of `{"label", "box": [x1, y1, x2, y2], "score"}`
/// - `<program> labels --model M` prints a JSON array of label strings
pub struct CommandDetector {
    program: PathBuf,
    model: String,
    /// Scratch directory for captured frames, removed on drop
    workdir: TempDir,
}

impl CommandDetector {
    pub fn new(program: impl Into<PathBuf>, model: impl Into<String>) -> Result<Self, DetectionError> {
        let workdir = tempfile::Builder::new().prefix("autocensor").tempdir()?;

        Ok(Self {
            program: program.into(),
            model: model.into(),
            workdir,
        })
    }

    /// Directory frames are written to
    #[cfg(test)]
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    fn run(&self, command: &mut Command) -> Result<Output, DetectionError> {
        let output = command.output().map_err(|source| DetectionError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(DetectionError::Exited {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Detector for CommandDetector {
    fn detect(
        &mut self,
        frame: &RgbaImage,
        mode: DetectMode,
    ) -> Result<Vec<Detection>, DetectionError> {
        let frame_file = self.workdir.path().join("frame.png");
        frame.save(&frame_file)?;

        let output = self.run(
            Command::new(&self.program)
                .args(["detect", "--model", &self.model, "--mode", mode.as_str()])
                .arg(&frame_file),
        )?;

        let detections = parse_detections(&output.stdout)?;
        debug!(count = detections.len(), "detector returned");
        Ok(detections)
    }

    fn available_labels(&self) -> Result<Vec<String>, DetectionError> {
        let output = self.run(Command::new(&self.program).args(["labels", "--model", &self.model]))?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Parse the detector's JSON output
fn parse_detections(stdout: &[u8]) -> Result<Vec<Detection>, DetectionError> {
    let raw: Vec<RawDetection> = serde_json::from_slice(stdout)?;

    Ok(raw
        .into_iter()
        .map(|d| Detection {
            label: d.label,
            bbox: BoundingBox::new(d.bbox[0], d.bbox[1], d.bbox[2], d.bbox[3]),
            confidence: d.score,
        })
        .collect())
}
