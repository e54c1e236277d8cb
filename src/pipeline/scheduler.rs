use std::time::Duration;

use super::{
    camera::VideoSource,
    loader::{ModelLoader, ModelState},
    overlay::{DrawingSurface, draw_result},
    topology::{Connection, hand_connections},
};
use crate::{config::OverlayStyle, error::PipelineError, types::InferenceResult};

/// What the loop knows about the surface and the frames it has handled.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderState {
    pub width: u32,
    pub height: u32,
    pub last_timestamp: Option<Duration>,
    pub detection_enabled: bool,
    /// Cleared when the surface cannot be sized; the video keeps playing.
    pub overlay_enabled: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            last_timestamp: None,
            detection_enabled: true,
            overlay_enabled: true,
        }
    }
}

/// Everything one tick touches, owned in one place and handed to the loop.
pub struct PipelineContext<D> {
    pub source: Option<Box<dyn VideoSource>>,
    pub loader: ModelLoader,
    pub surface: D,
    pub style: OverlayStyle,
    pub connections: &'static [Connection],
    pub max_hands: usize,
    pub state: RenderState,
    /// Hands detected on the frame at `state.last_timestamp`. Kept across
    /// ticks that repeat that frame, so hosts can redraw it.
    pub last_result: InferenceResult,
}

impl<D: DrawingSurface> PipelineContext<D> {
    pub fn new(
        source: Option<Box<dyn VideoSource>>,
        loader: ModelLoader,
        surface: D,
        style: OverlayStyle,
        max_hands: usize,
    ) -> Self {
        Self {
            source,
            loader,
            surface,
            style,
            connections: hand_connections(),
            max_hands: max_hands.max(1),
            state: RenderState::default(),
            last_result: InferenceResult::empty(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub frame_available: bool,
    pub resized: bool,
    pub inference_invoked: bool,
    /// The frame was already processed; the surface was cleared but
    /// `last_result` still describes it.
    pub duplicate: bool,
    pub hands_drawn: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub frames_processed: u64,
    pub duplicate_frames: u64,
    pub inference_failures: u64,
    pub hands_drawn: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Running,
    Stopped,
}

/// Whether the host should schedule another refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// The frame scheduler. Each call to [`RenderLoop::on_refresh`] is one tick
/// driven by the host's display refresh; ticks never overlap because the loop
/// is borrowed mutably for the whole tick.
pub struct RenderLoop<D> {
    ctx: PipelineContext<D>,
    phase: LoopPhase,
    stats: LoopStats,
    last_report: TickReport,
}

impl<D: DrawingSurface> RenderLoop<D> {
    pub fn new(ctx: PipelineContext<D>) -> Self {
        Self {
            ctx,
            phase: LoopPhase::Idle,
            stats: LoopStats::default(),
            last_report: TickReport::default(),
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// What the most recent tick did.
    pub fn last_report(&self) -> TickReport {
        self.last_report
    }

    pub fn context(&self) -> &PipelineContext<D> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut PipelineContext<D> {
        &mut self.ctx
    }

    pub fn model_state(&self) -> ModelState {
        self.ctx.loader.state()
    }

    pub fn set_detection_enabled(&mut self, enabled: bool) {
        self.ctx.state.detection_enabled = enabled;
    }

    /// One display refresh. Returns whether the host should keep refreshing.
    pub fn on_refresh(&mut self) -> TickControl {
        match self.phase {
            LoopPhase::Stopped => TickControl::Stop,
            LoopPhase::Idle => {
                let buffered = self
                    .ctx
                    .source
                    .as_ref()
                    .is_some_and(|source| source.data_available());
                if buffered {
                    log::info!("video data available, render loop running");
                    self.phase = LoopPhase::Running;
                    self.last_report = self.tick();
                }
                TickControl::Continue
            }
            LoopPhase::Running => {
                self.last_report = self.tick();
                TickControl::Continue
            }
        }
    }

    /// Teardown. The first call stops the loop and returns `true`; any later
    /// call is a no-op.
    pub fn stop(&mut self) -> bool {
        if self.phase == LoopPhase::Stopped {
            return false;
        }
        self.phase = LoopPhase::Stopped;
        let s = self.stats;
        log::info!(
            "render loop stopped after {} ticks: {} frames processed, {} duplicates skipped, {} inference failures, {} hands drawn",
            s.ticks,
            s.frames_processed,
            s.duplicate_frames,
            s.inference_failures,
            s.hands_drawn
        );
        true
    }

    fn tick(&mut self) -> TickReport {
        self.stats.ticks += 1;
        let mut report = TickReport::default();
        let model_state = self.ctx.loader.poll();

        let ctx = &mut self.ctx;
        let Some(source) = ctx.source.as_mut() else {
            return report;
        };
        let Some(frame) = source.current_frame() else {
            return report;
        };
        report.frame_available = true;

        if ctx.state.overlay_enabled && (ctx.state.width, ctx.state.height) != (frame.width, frame.height) {
            match ctx.surface.resize(frame.width, frame.height) {
                Ok(()) => {
                    log::debug!("overlay resized to {}x{}", frame.width, frame.height);
                    ctx.state.width = frame.width;
                    ctx.state.height = frame.height;
                    report.resized = true;
                }
                Err(err) => {
                    log::error!("{err}; hand overlay disabled");
                    ctx.state.overlay_enabled = false;
                    ctx.last_result = InferenceResult::empty();
                }
            }
        }
        if !ctx.state.overlay_enabled {
            return report;
        }

        ctx.surface.clear();

        if model_state != ModelState::Ready || !ctx.state.detection_enabled {
            ctx.last_result = InferenceResult::empty();
            return report;
        }
        // Same millisecond granularity the engine's frame clock works in.
        if ctx.state.last_timestamp.map(|ts| ts.as_millis()) == Some(frame.timestamp.as_millis()) {
            self.stats.duplicate_frames += 1;
            report.duplicate = true;
            return report;
        }
        let Some(engine) = ctx.loader.engine_mut() else {
            return report;
        };

        ctx.state.last_timestamp = Some(frame.timestamp);
        report.inference_invoked = true;
        self.stats.frames_processed += 1;

        match engine.detect(frame, frame.timestamp_ms()) {
            Ok(mut result) => {
                result.truncate(ctx.max_hands);
                draw_result(&mut ctx.surface, &result, ctx.connections, &ctx.style);
                report.hands_drawn = result.hands.len();
                self.stats.hands_drawn += result.hands.len() as u64;
                ctx.last_result = result;
            }
            Err(err) => {
                ctx.last_result = InferenceResult::empty();
                self.stats.inference_failures += 1;
                log::warn!("{}", PipelineError::inference(&err));
            }
        }
        report
    }
}
