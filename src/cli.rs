use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
    config::{
        CaptureConfig, ComputeDelegate, ConnectorStyle, DEFAULT_MAX_HANDS,
        DEFAULT_MIN_HAND_CONFIDENCE, DEFAULT_MODEL_LOCATION, DEFAULT_REFRESH_HZ, LandmarkStyle,
        LoaderOptions, OverlayStyle, RefreshConfig, RunningMode,
    },
    error::PipelineError,
    types::Rgba,
};

/// Live hand skeleton overlay on top of a camera feed.
#[derive(Parser, Debug)]
#[command(name = "hand-overlay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Camera to open, as listed by --list-cameras
    #[arg(long)]
    pub camera: Option<u32>,

    /// Print the available cameras and exit
    #[arg(long)]
    pub list_cameras: bool,

    /// Backend used to run inference
    #[arg(long, value_enum, default_value_t = ComputeDelegate::Gpu)]
    pub delegate: ComputeDelegate,

    /// Maximum number of hands to detect per frame
    #[arg(long, default_value_t = DEFAULT_MAX_HANDS)]
    pub max_hands: usize,

    #[arg(long, value_enum, default_value_t = RunningMode::Stream)]
    pub running_mode: RunningMode,

    /// Base URL or directory holding the model files
    #[arg(long, default_value = DEFAULT_MODEL_LOCATION)]
    pub model_location: String,

    /// Cache directory for downloaded models
    #[arg(long, default_value = "models")]
    pub model_dir: PathBuf,

    /// Minimum hand presence confidence (0.0-1.0)
    #[arg(long, default_value_t = DEFAULT_MIN_HAND_CONFIDENCE)]
    pub min_hand_confidence: f32,

    #[arg(long, default_value = "#00FF00")]
    pub connector_color: Rgba,

    #[arg(long, default_value_t = 5.0)]
    pub connector_width: f32,

    #[arg(long, default_value = "#FF0000")]
    pub landmark_color: Rgba,

    #[arg(long, default_value_t = 4.0)]
    pub landmark_radius: f32,

    /// Run without a window, ticking on a timer instead of display refresh
    #[arg(long)]
    pub headless: bool,

    /// Tick rate of the headless driver
    #[arg(long, default_value_t = DEFAULT_REFRESH_HZ)]
    pub refresh_hz: f32,

    /// Stop the headless run after this many seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Write the last composited frame to this PNG when a headless run ends
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn loader_options(&self) -> Result<LoaderOptions, PipelineError> {
        let options = LoaderOptions {
            compute_delegate: self.delegate,
            max_hands: self.max_hands,
            running_mode: self.running_mode,
            model_asset_location: self.model_location.clone(),
            model_dir: self.model_dir.clone(),
            min_hand_confidence: self.min_hand_confidence,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            connector: ConnectorStyle {
                color: self.connector_color,
                line_width: self.connector_width.max(1.0),
            },
            landmark: LandmarkStyle {
                color: self.landmark_color,
                radius: self.landmark_radius.max(0.0),
            },
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            camera_index: self.camera,
        }
    }

    pub fn refresh_config(&self) -> Result<RefreshConfig, PipelineError> {
        if !(self.refresh_hz.is_finite() && self.refresh_hz > 0.0) {
            return Err(PipelineError::Config(format!(
                "refresh rate must be positive, got {}",
                self.refresh_hz
            )));
        }
        let duration = self
            .duration
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|err| {
                    PipelineError::Config(format!("invalid duration of {secs} seconds: {err}"))
                })
            })
            .transpose()?;
        Ok(RefreshConfig {
            refresh_hz: self.refresh_hz,
            duration,
            snapshot: self.snapshot.clone(),
        })
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
