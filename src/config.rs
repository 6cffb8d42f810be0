// App-level configuration - loaded from a JSON file, overridden by flags
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::DetectMode;
use crate::error::ConfigError;
use crate::sync::{ControllerSettings, LabelPolicy, DEFAULT_CENSORED_LABELS};

/// Persistent settings. Every field has a default, so a partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Detection model name handed to the detector
    pub model: String,
    /// Detector program (see `CommandDetector`)
    pub detector_command: PathBuf,
    pub detect_mode: DetectMode,
    /// Labels to censor
    pub censor_labels: Vec<String>,
    pub overlay_ttl_secs: f64,
    pub min_confidence: Option<f32>,
    /// Consecutive failing ticks before degraded mode
    pub degraded_after: u32,
    /// Virtual display size the video is fitted into
    pub osd_width: u32,
    pub osd_height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            detector_command: PathBuf::from("nudenet-detect"),
            detect_mode: DetectMode::Fast,
            censor_labels: DEFAULT_CENSORED_LABELS.iter().map(|s| s.to_string()).collect(),
            overlay_ttl_secs: 2.0,
            min_confidence: None,
            degraded_after: 5,
            osd_width: 1280,
            osd_height: 720,
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from the platform config file when `None`.
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => Self::default(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the path to the default config file
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "autocensor", "AutoCensor")
            .map(|proj_dirs| proj_dirs.config_dir().join("config.json"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.overlay_ttl_secs.is_finite() || self.overlay_ttl_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "overlay_ttl_secs must be positive, got {}",
                self.overlay_ttl_secs
            )));
        }
        if self.osd_width == 0 || self.osd_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "display size must be non-zero, got {}x{}",
                self.osd_width, self.osd_height
            )));
        }
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(ConfigError::Invalid(format!(
                    "min_confidence must be within 0..=1, got {min}"
                )));
            }
        }
        Ok(())
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, model: Option<String>, censor: Vec<String>, ttl: Option<f64>) -> Result<Self, ConfigError> {
        if let Some(model) = model {
            self.model = model;
        }
        if !censor.is_empty() {
            self.censor_labels = censor;
        }
        if let Some(ttl) = ttl {
            self.overlay_ttl_secs = ttl;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn policy(&self) -> LabelPolicy {
        LabelPolicy::new(self.censor_labels.iter().cloned())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            overlay_ttl: Duration::from_secs_f64(self.overlay_ttl_secs),
            detect_mode: self.detect_mode,
            min_confidence: self.min_confidence,
            degraded_after: self.degraded_after,
        }
    }
}
