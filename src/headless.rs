use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use image::{ImageBuffer, Rgba};

use crate::{
    config::RefreshConfig,
    pipeline::{DrawingSurface, RefreshTask, RenderLoop, RgbaSurface, overlay::draw_result},
};

/// Runs the overlay loop without a window, ticking at the configured refresh
/// rate until the duration elapses (or forever when none is set).
pub fn run(render: RenderLoop<RgbaSurface>, config: &RefreshConfig) -> Result<()> {
    log::info!(
        "running headless at {:.1} Hz{}",
        config.refresh_hz,
        config
            .duration
            .map(|d| format!(" for {:.1}s", d.as_secs_f64()))
            .unwrap_or_default()
    );

    let task = RefreshTask::spawn(render, config.interval())?;
    let started = Instant::now();
    while config.duration.is_none_or(|limit| started.elapsed() < limit) && !task.is_finished() {
        thread::sleep(Duration::from_millis(50));
    }

    let mut render = task.stop()?;
    if let Some(path) = &config.snapshot {
        save_snapshot(&mut render, path)?;
    }
    Ok(())
}

/// Writes the newest video frame with the hands detected on it drawn on top.
///
/// The loop clears its surface on every tick, including ticks that repeat an
/// already processed frame, so the overlay is redrawn here from `last_result`.
fn save_snapshot(render: &mut RenderLoop<RgbaSurface>, path: &Path) -> Result<()> {
    let ctx = render.context_mut();
    let frame = ctx
        .source
        .as_mut()
        .and_then(|source| source.current_frame())
        .ok_or_else(|| anyhow!("no video frame captured, nothing to snapshot"))?;

    let processed = ctx
        .state
        .last_timestamp
        .is_some_and(|ts| ts.as_millis() == frame.timestamp.as_millis());
    let hands = if ctx.state.overlay_enabled && processed {
        ctx.last_result.hands.len()
    } else {
        0
    };

    let rgba = if hands > 0 {
        let mut overlay = RgbaSurface::new();
        overlay.resize(frame.width, frame.height)?;
        draw_result(&mut overlay, &ctx.last_result, ctx.connections, &ctx.style);
        overlay
            .composite_over(frame)
            .ok_or_else(|| anyhow!("overlay does not match {}x{}", frame.width, frame.height))?
    } else {
        frame.rgba.clone()
    };

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.width, frame.height, rgba)
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
    buffer
        .save(path)
        .with_context(|| format!("failed to write snapshot {}", path.display()))?;

    log::info!(
        "snapshot with {} hand(s) written to {}",
        hands,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;
    use crate::{
        config::OverlayStyle,
        pipeline::{
            ModelLoader, PipelineContext, VideoSource,
            loader::tests::{NoHands, wait_for_outcome},
            scheduler::tests::ready_loader,
        },
        types::Frame,
    };

    struct StillImage(Frame);

    impl VideoSource for StillImage {
        fn data_available(&self) -> bool {
            true
        }
        fn current_frame(&mut self) -> Option<&Frame> {
            Some(&self.0)
        }
    }

    fn still_frame(width: u32, height: u32) -> Frame {
        Frame {
            rgba: vec![0, 0, 0, 255].repeat((width * height) as usize),
            width,
            height,
            timestamp: Duration::from_millis(1),
        }
    }

    fn still_loop(source: Option<Box<dyn VideoSource>>) -> RenderLoop<RgbaSurface> {
        let mut loader = ModelLoader::new();
        loader.load(
            Default::default(),
            Box::new(
                |_: &crate::config::LoaderOptions| -> anyhow::Result<Box<dyn crate::pipeline::engine::LandmarkEngine>> {
                    Ok(Box::new(NoHands))
                },
            ),
        );
        wait_for_outcome(&mut loader);
        RenderLoop::new(PipelineContext::new(
            source,
            loader,
            RgbaSurface::new(),
            OverlayStyle::default(),
            2,
        ))
    }

    #[test]
    fn runs_for_duration_and_writes_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snap.png");
        let frame = Frame {
            rgba: vec![200; 8 * 6 * 4],
            width: 8,
            height: 6,
            timestamp: Duration::from_millis(1),
        };
        let config = RefreshConfig {
            refresh_hz: 200.0,
            duration: Some(Duration::from_millis(100)),
            snapshot: Some(path.clone()),
        };

        run(still_loop(Some(Box::new(StillImage(frame)))), &config).expect("headless run");

        let saved = image::open(&path).expect("snapshot readable");
        assert_eq!((saved.width(), saved.height()), (8, 6));
    }

    #[test]
    fn snapshot_keeps_hands_after_repeated_frames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hand.png");
        let calls = Arc::new(AtomicUsize::new(0));
        let render = RenderLoop::new(PipelineContext::new(
            Some(Box::new(StillImage(still_frame(20, 20)))),
            ready_loader(calls.clone(), 1, false),
            RgbaSurface::new(),
            OverlayStyle::default(),
            2,
        ));
        let config = RefreshConfig {
            refresh_hz: 200.0,
            duration: Some(Duration::from_millis(100)),
            snapshot: Some(path.clone()),
        };

        run(render, &config).expect("headless run");

        // One inference, then only repeats of the same frame.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let saved = image::open(&path).expect("snapshot readable").to_rgba8();
        // Landmark marker at the center, bare video in the corner.
        assert_eq!(saved.get_pixel(10, 10).0, [255, 0, 0, 255]);
        assert_eq!(saved.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn snapshot_without_video_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RefreshConfig {
            refresh_hz: 200.0,
            duration: Some(Duration::from_millis(20)),
            snapshot: Some(dir.path().join("snap.png")),
        };
        assert!(run(still_loop(None), &config).is_err());
    }
}
