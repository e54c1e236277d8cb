pub mod assets;
pub mod camera;
pub mod engine;
pub mod loader;
pub mod overlay;
pub mod pixel_decode;
pub mod refresh;
pub mod scheduler;
pub mod topology;

// Re-exports for convenience
pub use camera::{VideoSource, acquire, available_cameras};
pub use engine::ort_factory;
pub use loader::{ModelLoader, ModelState};
pub use overlay::{DrawingSurface, RgbaSurface};
pub use refresh::RefreshTask;
pub use scheduler::{LoopPhase, PipelineContext, RenderLoop, TickControl};
