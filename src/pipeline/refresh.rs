use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};

use super::{
    overlay::DrawingSurface,
    scheduler::{RenderLoop, TickControl},
};

/// Drives a [`RenderLoop`] from a dedicated thread at a fixed refresh rate,
/// standing in for a display's frame callbacks when no window is open.
pub struct RefreshTask<D> {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<RenderLoop<D>>>,
}

impl<D: DrawingSurface + Send + 'static> RefreshTask<D> {
    pub fn spawn(mut render: RenderLoop<D>, interval: Duration) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("refresh".to_string())
            .spawn(move || {
                let mut next = Instant::now();
                while !stop_flag.load(Ordering::Relaxed) {
                    if render.on_refresh() == TickControl::Stop {
                        break;
                    }
                    next += interval;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        // Fell behind; skip the missed refreshes instead of bursting.
                        next = now;
                    }
                }
                render.stop();
                render
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Cancels the pending refresh and hands back the stopped loop.
    pub fn stop(mut self) -> Result<RenderLoop<D>> {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow!("refresh task already stopped"))?;
        handle
            .join()
            .map_err(|_| anyhow!("refresh thread panicked"))
    }
}

impl<D> Drop for RefreshTask<D> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        config::OverlayStyle,
        pipeline::scheduler::{
            LoopPhase, PipelineContext,
            tests::{RecordingSurface, ScriptedSource, ready_loader},
        },
    };

    #[test]
    fn ticks_until_stopped_then_returns_the_loop() {
        let source = ScriptedSource::default();
        source.show(64, 48, 1);
        let calls = Arc::new(AtomicUsize::new(0));
        let render = RenderLoop::new(PipelineContext::new(
            source.boxed(),
            ready_loader(calls.clone(), 1, false),
            RecordingSurface::default(),
            OverlayStyle::default(),
            2,
        ));

        let task = RefreshTask::spawn(render, Duration::from_millis(2)).expect("spawn");
        let deadline = Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!task.is_finished());

        let render = task.stop().expect("join");
        assert_eq!(render.phase(), LoopPhase::Stopped);
        assert!(render.stats().ticks >= 1);
        // The frame never changed, so it was inferred exactly once.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_the_task_cancels_it() {
        let source = ScriptedSource::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let render = RenderLoop::new(PipelineContext::new(
            source.boxed(),
            ready_loader(calls.clone(), 1, false),
            RecordingSurface::default(),
            OverlayStyle::default(),
            2,
        ));
        let task = RefreshTask::spawn(render, Duration::from_millis(1)).expect("spawn");
        drop(task);

        // No thread left to pick this frame up.
        source.show(64, 48, 1);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
