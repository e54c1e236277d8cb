pub mod ort;
pub mod palm;
pub mod preprocess;

use anyhow::{Result, anyhow};

use crate::{
    config::{LoaderOptions, RunningMode},
    types::{Frame, InferenceResult},
};

pub use self::ort::OrtHandLandmarker;

/// Hand landmark detector consumed by the render loop.
///
/// `detect` runs synchronously inside a tick. An empty result means no hand
/// was found; an error means this tick has no result.
pub trait LandmarkEngine: Send + 'static {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<InferenceResult>;
}

/// Builds an engine on the loader thread.
pub type EngineFactory =
    Box<dyn FnOnce(&LoaderOptions) -> Result<Box<dyn LandmarkEngine>> + Send + 'static>;

/// Factory for the ONNX Runtime hand landmarker.
pub fn ort_factory() -> EngineFactory {
    Box::new(|options: &LoaderOptions| -> Result<Box<dyn LandmarkEngine>> {
        let engine = OrtHandLandmarker::create(options)?;
        Ok(Box::new(engine) as Box<dyn LandmarkEngine>)
    })
}

/// Enforces the timestamp contract of the running mode: a stream must move
/// forward, still images carry no ordering. Timestamps are whole milliseconds;
/// the render loop treats frames within the same millisecond as one frame, so
/// they never reach the clock twice.
#[derive(Debug)]
pub struct FrameClock {
    mode: RunningMode,
    last_ms: Option<u64>,
}

impl FrameClock {
    pub fn new(mode: RunningMode) -> Self {
        Self {
            mode,
            last_ms: None,
        }
    }

    pub fn admit(&mut self, timestamp_ms: u64) -> Result<()> {
        if self.mode == RunningMode::SingleImage {
            return Ok(());
        }
        if let Some(last) = self.last_ms {
            if timestamp_ms <= last {
                return Err(anyhow!(
                    "stream timestamps must increase: got {timestamp_ms} ms after {last} ms"
                ));
            }
        }
        self.last_ms = Some(timestamp_ms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_mode_requires_increasing_timestamps() {
        let mut clock = FrameClock::new(RunningMode::Stream);
        assert!(clock.admit(10).is_ok());
        assert!(clock.admit(11).is_ok());
        assert!(clock.admit(11).is_err());
        assert!(clock.admit(5).is_err());
        // A rejected timestamp does not move the clock back.
        assert!(clock.admit(12).is_ok());
    }

    #[test]
    fn single_image_mode_ignores_timestamps() {
        let mut clock = FrameClock::new(RunningMode::SingleImage);
        assert!(clock.admit(10).is_ok());
        assert!(clock.admit(10).is_ok());
        assert!(clock.admit(0).is_ok());
    }
}
