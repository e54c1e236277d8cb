use anyhow::{Context, Result, anyhow};
use ort::{
    session::{
        Session,
        builder::{GraphOptimizationLevel, SessionBuilder},
    },
    value::Tensor,
};

use super::{
    FrameClock, LandmarkEngine,
    palm::{PalmDetector, PalmDetectorConfig, PalmRegion, crop_from_palm},
    preprocess::{LANDMARK_INPUT_SIZE, decode_landmarks, rotated_crop_tensor},
};
use crate::{
    config::{ComputeDelegate, LoaderOptions},
    pipeline::assets::ensure_model_assets,
    types::{Frame, HandLandmarkSet, InferenceResult},
};

pub(super) fn session_builder(delegate: ComputeDelegate) -> Result<SessionBuilder> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?;
    with_delegate(builder, delegate)
}

#[cfg(feature = "cuda")]
fn with_delegate(builder: SessionBuilder, delegate: ComputeDelegate) -> Result<SessionBuilder> {
    use ort::execution_providers::CUDAExecutionProvider;

    match delegate {
        ComputeDelegate::Gpu => Ok(builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])?),
        ComputeDelegate::Cpu => Ok(builder),
    }
}

#[cfg(not(feature = "cuda"))]
fn with_delegate(builder: SessionBuilder, delegate: ComputeDelegate) -> Result<SessionBuilder> {
    if delegate == ComputeDelegate::Gpu {
        log::warn!("GPU delegate requested but built without the `cuda` feature, using CPU");
    }
    Ok(builder)
}

/// Two-stage hand landmarker: palm detection picks the hands, a landmark
/// model regresses 21 joints inside a rotated crop around each palm.
pub struct OrtHandLandmarker {
    palm_detector: PalmDetector,
    landmarks: Session,
    max_hands: usize,
    min_confidence: f32,
    clock: FrameClock,
}

impl OrtHandLandmarker {
    pub fn create(options: &LoaderOptions) -> Result<Self> {
        let assets = ensure_model_assets(&options.model_asset_location, &options.model_dir)?;

        let palm_detector = PalmDetector::load(
            &assets.palm_detector,
            options.compute_delegate,
            PalmDetectorConfig::default(),
        )?;
        let landmarks = session_builder(options.compute_delegate)?
            .commit_from_file(&assets.hand_landmarks)
            .with_context(|| {
                format!(
                    "failed to load landmark model from {}",
                    assets.hand_landmarks.display()
                )
            })?;

        log::info!(
            "hand landmarker ready ({:?}, {:?}, up to {} hands) using {} and {}",
            options.compute_delegate,
            options.running_mode,
            options.max_hands,
            assets.palm_detector.display(),
            assets.hand_landmarks.display()
        );

        Ok(Self {
            palm_detector,
            landmarks,
            max_hands: options.max_hands,
            min_confidence: options.min_hand_confidence,
            clock: FrameClock::new(options.running_mode),
        })
    }

    fn estimate(&mut self, frame: &Frame, palm: &PalmRegion) -> Result<Option<HandLandmarkSet>> {
        let (center, side, angle) = crop_from_palm(palm);
        let (input, transform) =
            rotated_crop_tensor(frame, center, side, angle, LANDMARK_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .landmarks
            .run(ort::inputs![tensor])
            .context("failed to run landmark session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("landmark model returned no outputs"));
        }
        let coords = outputs[0].try_extract_array::<f32>()?;
        let flat: Vec<f32> = coords.iter().copied().collect();
        let raw = decode_landmarks(&flat)?;

        let presence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            1.0
        };
        let confidence = (presence * palm.score).clamp(0.0, 1.0);
        if confidence < self.min_confidence {
            log::debug!("dropping hand with confidence {confidence:.2}");
            return Ok(None);
        }

        let landmarks = raw.map(|[x, y, z]| transform.normalize(x, y, z));
        Ok(Some(HandLandmarkSet::new(landmarks, confidence)))
    }
}

impl LandmarkEngine for OrtHandLandmarker {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<InferenceResult> {
        self.clock.admit(timestamp_ms)?;

        let palms = self.palm_detector.detect(frame)?;
        let mut hands = Vec::with_capacity(self.max_hands);
        for palm in palms.iter().take(self.max_hands) {
            if let Some(hand) = self.estimate(frame, palm)? {
                hands.push(hand);
            }
        }

        Ok(InferenceResult { hands })
    }
}
