use std::{fmt, thread};

use crossbeam_channel::{Receiver, TryRecvError, bounded};

use super::engine::{EngineFactory, LandmarkEngine};
use crate::{config::LoaderOptions, error::PipelineError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelState::Unloaded => "unloaded",
            ModelState::Loading => "loading",
            ModelState::Ready => "ready",
            ModelState::Failed => "failed",
        })
    }
}

type LoadOutcome = Result<Box<dyn LandmarkEngine>, PipelineError>;

/// Builds the inference engine once, off the render loop.
///
/// The loop owns the loader and is the only writer of its state: the loader
/// thread hands its outcome back over a channel that [`ModelLoader::poll`]
/// drains without blocking.
pub struct ModelLoader {
    state: ModelState,
    outcome_rx: Option<Receiver<LoadOutcome>>,
    engine: Option<Box<dyn LandmarkEngine>>,
    failure: Option<PipelineError>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLoader {
    pub fn new() -> Self {
        Self {
            state: ModelState::Unloaded,
            outcome_rx: None,
            engine: None,
            failure: None,
            handle: None,
        }
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn failure(&self) -> Option<&PipelineError> {
        self.failure.as_ref()
    }

    /// Starts building the engine. Only the first call does anything; later
    /// calls report the state the first one led to.
    pub fn load(&mut self, options: LoaderOptions, factory: EngineFactory) -> ModelState {
        if self.state != ModelState::Unloaded {
            log::debug!("model load already requested ({}), ignoring", self.state);
            return self.state;
        }

        if let Err(err) = options.validate() {
            self.fail(PipelineError::ModelLoadFailure(err.to_string()));
            return self.state;
        }

        let (outcome_tx, outcome_rx) = bounded(1);
        let spawned = thread::Builder::new()
            .name("model-loader".to_string())
            .spawn(move || {
                log::info!(
                    "loading hand landmark model from {}",
                    options.model_asset_location
                );
                let outcome = factory(&options).map_err(|err| PipelineError::model_load(&err));
                let _ = outcome_tx.send(outcome);
            });

        match spawned {
            Ok(handle) => {
                self.state = ModelState::Loading;
                self.outcome_rx = Some(outcome_rx);
                self.handle = Some(handle);
            }
            Err(err) => self.fail(PipelineError::ModelLoadFailure(format!(
                "failed to spawn loader thread: {err}"
            ))),
        }
        self.state
    }

    /// Picks up the loader thread's outcome if it has arrived. Never blocks.
    pub fn poll(&mut self) -> ModelState {
        if self.state != ModelState::Loading {
            return self.state;
        }
        let Some(rx) = self.outcome_rx.as_ref() else {
            return self.state;
        };

        match rx.try_recv() {
            Ok(Ok(engine)) => {
                log::info!("hand landmark model ready");
                self.engine = Some(engine);
                self.state = ModelState::Ready;
                self.finish_thread();
            }
            Ok(Err(err)) => {
                self.fail(err);
                self.finish_thread();
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.fail(PipelineError::ModelLoadFailure(
                    "loader thread exited without a result".to_string(),
                ));
                self.finish_thread();
            }
        }
        self.state
    }

    /// The engine, once the state is `Ready`.
    pub fn engine_mut(&mut self) -> Option<&mut (dyn LandmarkEngine + 'static)> {
        self.engine.as_deref_mut()
    }

    fn fail(&mut self, err: PipelineError) {
        log::error!("{err}; continuing without hand overlay");
        self.failure = Some(err);
        self.state = ModelState::Failed;
    }

    fn finish_thread(&mut self) {
        self.outcome_rx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::{Duration, Instant},
    };

    use anyhow::anyhow;

    use super::*;
    use crate::types::{Frame, InferenceResult};

    pub(crate) struct NoHands;

    impl LandmarkEngine for NoHands {
        fn detect(&mut self, _: &Frame, _: u64) -> anyhow::Result<InferenceResult> {
            Ok(InferenceResult::empty())
        }
    }

    pub(crate) fn wait_for_outcome(loader: &mut ModelLoader) -> ModelState {
        let deadline = Instant::now() + Duration::from_secs(5);
        while loader.poll() == ModelState::Loading && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        loader.state()
    }

    fn counting_factory(count: Arc<AtomicUsize>) -> EngineFactory {
        Box::new(move |_: &LoaderOptions| -> anyhow::Result<Box<dyn LandmarkEngine>> {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoHands))
        })
    }

    #[test]
    fn loads_once_and_becomes_ready() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut loader = ModelLoader::new();
        assert_eq!(loader.state(), ModelState::Unloaded);
        assert!(loader.engine_mut().is_none());

        let state = loader.load(LoaderOptions::default(), counting_factory(count.clone()));
        assert_eq!(state, ModelState::Loading);
        // Second request while loading is ignored.
        assert_eq!(
            loader.load(LoaderOptions::default(), counting_factory(count.clone())),
            ModelState::Loading
        );

        assert_eq!(wait_for_outcome(&mut loader), ModelState::Ready);
        assert!(loader.engine_mut().is_some());

        // And after ready as well.
        assert_eq!(
            loader.load(LoaderOptions::default(), counting_factory(count.clone())),
            ModelState::Ready
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn factory_error_is_terminal() {
        let mut loader = ModelLoader::new();
        loader.load(
            LoaderOptions::default(),
            Box::new(|_: &LoaderOptions| -> anyhow::Result<Box<dyn LandmarkEngine>> {
                Err(anyhow!("asset fetch refused"))
            }),
        );
        assert_eq!(wait_for_outcome(&mut loader), ModelState::Failed);
        assert!(matches!(
            loader.failure(),
            Some(PipelineError::ModelLoadFailure(msg)) if msg.contains("asset fetch refused")
        ));

        let retried = loader.load(
            LoaderOptions::default(),
            Box::new(|_: &LoaderOptions| -> anyhow::Result<Box<dyn LandmarkEngine>> {
                Ok(Box::new(NoHands))
            }),
        );
        assert_eq!(retried, ModelState::Failed);
        assert_eq!(loader.poll(), ModelState::Failed);
        assert!(loader.engine_mut().is_none());
    }

    #[test]
    fn invalid_options_fail_without_building() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut loader = ModelLoader::new();
        let options = LoaderOptions {
            max_hands: 0,
            ..LoaderOptions::default()
        };
        assert_eq!(
            loader.load(options, counting_factory(count.clone())),
            ModelState::Failed
        );
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_factory_is_reported_as_failure() {
        let mut loader = ModelLoader::new();
        loader.load(
            LoaderOptions::default(),
            Box::new(|_: &LoaderOptions| -> anyhow::Result<Box<dyn LandmarkEngine>> {
                panic!("loader blew up")
            }),
        );
        assert_eq!(wait_for_outcome(&mut loader), ModelState::Failed);
    }
}
