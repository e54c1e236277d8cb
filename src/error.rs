use thiserror::Error;

/// Failures the overlay pipeline can run into. Each one is caught where it
/// happens and logged; none of them stops the video or the render loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("no usable camera: {0}")]
    DeviceUnavailable(String),
    #[error("hand landmark model failed to load: {0}")]
    ModelLoadFailure(String),
    #[error("hand landmark inference failed: {0}")]
    InferenceFailure(String),
    #[error("overlay surface unavailable: {0}")]
    RenderContextUnavailable(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Builds a load failure from an `anyhow` chain, keeping every cause.
    pub fn model_load(err: &anyhow::Error) -> Self {
        PipelineError::ModelLoadFailure(format!("{err:#}"))
    }

    pub fn inference(err: &anyhow::Error) -> Self {
        PipelineError::InferenceFailure(format!("{err:#}"))
    }
}
