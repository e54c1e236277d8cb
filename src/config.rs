use std::{path::PathBuf, time::Duration};

use clap::ValueEnum;

use crate::{error::PipelineError, types::Rgba};

pub const DEFAULT_MODEL_LOCATION: &str =
    "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models";
pub const DEFAULT_MAX_HANDS: usize = 2;
pub const DEFAULT_MIN_HAND_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_REFRESH_HZ: f32 = 60.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ComputeDelegate {
    Cpu,
    #[default]
    Gpu,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum RunningMode {
    /// Continuous video; timestamps must keep increasing.
    #[default]
    Stream,
    /// Independent still images; timestamps are ignored.
    SingleImage,
}

/// Everything the model loader needs to build an inference engine.
#[derive(Clone, Debug, PartialEq)]
pub struct LoaderOptions {
    pub compute_delegate: ComputeDelegate,
    pub max_hands: usize,
    pub running_mode: RunningMode,
    /// Base location of the model files: an http(s) URL prefix, a `file://`
    /// URI or a local directory.
    pub model_asset_location: String,
    /// Where remote model files are cached after the first download.
    pub model_dir: PathBuf,
    pub min_hand_confidence: f32,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            compute_delegate: ComputeDelegate::default(),
            max_hands: DEFAULT_MAX_HANDS,
            running_mode: RunningMode::default(),
            model_asset_location: DEFAULT_MODEL_LOCATION.to_string(),
            model_dir: PathBuf::from("models"),
            min_hand_confidence: DEFAULT_MIN_HAND_CONFIDENCE,
        }
    }
}

impl LoaderOptions {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_hands < 1 {
            return Err(PipelineError::Config(format!(
                "max hands must be at least 1, got {}",
                self.max_hands
            )));
        }
        if !(0.0..=1.0).contains(&self.min_hand_confidence) {
            return Err(PipelineError::Config(format!(
                "hand confidence threshold must be within [0, 1], got {}",
                self.min_hand_confidence
            )));
        }
        if self.model_asset_location.trim().is_empty() {
            return Err(PipelineError::Config(
                "model asset location is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConnectorStyle {
    pub color: Rgba,
    pub line_width: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkStyle {
    pub color: Rgba,
    pub radius: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    pub connector: ConnectorStyle,
    pub landmark: LandmarkStyle,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            connector: ConnectorStyle {
                color: Rgba::rgb(0x00, 0xFF, 0x00),
                line_width: 5.0,
            },
            landmark: LandmarkStyle {
                color: Rgba::rgb(0xFF, 0x00, 0x00),
                radius: 4.0,
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Position in the enumerated device list; `None` picks the first camera.
    pub camera_index: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RefreshConfig {
    pub refresh_hz: f32,
    pub duration: Option<Duration>,
    pub snapshot: Option<PathBuf>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_hz: DEFAULT_REFRESH_HZ,
            duration: None,
            snapshot: None,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_nanos((1e9 / f64::from(self.refresh_hz.max(1.0))).round() as u64)
    }
}
