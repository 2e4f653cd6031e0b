use std::sync::Arc;

use simbridge_sys::ModelVariant;
use tracing::{error, info};

use crate::boundary::EngineBoundary;
use crate::cancel::CancelToken;
use crate::config::LoopConfig;
use crate::driver::{LoopHandle, LoopReport, StepObserver, UpdateLoop};
use crate::error::HostError;
use crate::input::InputSource;
use crate::session::{EngineSession, SessionState};

/// A live session with its update loop running in the background.
///
/// Shutdown always stops and joins the loop before the engine is destroyed,
/// whether it is requested explicitly or happens on drop.
pub struct Simulation<V: ModelVariant, B: EngineBoundary<V>> {
    session: Arc<EngineSession<V, B>>,
    worker: Option<LoopHandle>,
    token: CancelToken,
    report: Option<LoopReport>,
}

impl<V, B> Simulation<V, B>
where
    V: ModelVariant,
    B: EngineBoundary<V> + 'static,
{
    /// Creates the engine and starts driving it.
    ///
    /// Initialisation failures are returned before any thread is spawned.
    pub fn start<S, O>(
        boundary: B,
        config: LoopConfig,
        source: S,
        observer: O,
    ) -> Result<Self, HostError>
    where
        S: InputSource<V::Input> + 'static,
        O: StepObserver<V> + 'static,
    {
        Self::start_with_token(boundary, config, source, observer, CancelToken::new())
    }

    /// Like [`start`](Self::start), but stops on an existing token. A token
    /// cancelled before the call still creates and destroys the engine, with
    /// no steps in between.
    pub fn start_with_token<S, O>(
        boundary: B,
        config: LoopConfig,
        source: S,
        observer: O,
        token: CancelToken,
    ) -> Result<Self, HostError>
    where
        S: InputSource<V::Input> + 'static,
        O: StepObserver<V> + 'static,
    {
        config.validate()?;
        let session = Arc::new(EngineSession::open(boundary)?);
        let worker = UpdateLoop::new(config, source, observer)
            .spawn(Arc::clone(&session), token.clone())?;
        info!(session = session.id(), variant = V::NAME, "simulation started");
        Ok(Self {
            session,
            worker: Some(worker),
            token,
            report: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn steps(&self) -> u64 {
        self.session.steps()
    }

    pub fn with_boundary<R>(&self, func: impl FnOnce(&B) -> R) -> R {
        self.session.with_boundary(func)
    }

    /// Token that stops the loop when cancelled, e.g. from a signal handler.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }

    /// Blocks until the loop stops on its own (run limit, cancellation from
    /// elsewhere or a closed session), then destroys the engine.
    pub fn wait(&mut self) -> Result<LoopReport, HostError> {
        let joined = match self.worker.take() {
            Some(worker) => worker.join().map(Some),
            None => Ok(None),
        };
        self.finish(joined)
    }

    /// Stops the loop, waits for it and destroys the engine. Idempotent.
    pub fn shutdown(&mut self) -> Result<LoopReport, HostError> {
        self.token.cancel();
        let stopped = match self.worker.take() {
            Some(worker) => worker.stop().map(Some),
            None => Ok(None),
        };
        self.finish(stopped)
    }

    fn finish(
        &mut self,
        joined: Result<Option<LoopReport>, HostError>,
    ) -> Result<LoopReport, HostError> {
        // Destroy runs even when the worker panicked.
        let released = self.session.destroy();
        if released {
            info!(session = self.session.id(), "simulation shut down");
        }
        match joined {
            Ok(Some(report)) => {
                self.report = Some(report.clone());
                Ok(report)
            }
            Ok(None) => self.report.clone().ok_or(HostError::WorkerPanicked),
            Err(err) => Err(err),
        }
    }
}

impl<V: ModelVariant, B: EngineBoundary<V>> Drop for Simulation<V, B> {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.stop() {
                error!(?err, "update loop failed during shutdown");
            }
        }
        self.session.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{StepRecord, StopReason, TracingObserver};
    use crate::input::ConstantInput;
    use crate::pacing::Pacing;
    use crate::testing::{distance_model, ScriptedEngine};
    use simbridge_sys::{Distance, DistanceInput};
    use std::time::Duration;

    #[test]
    fn bounded_simulation_finishes_and_destroys() {
        let engine = ScriptedEngine::<Distance>::new(distance_model(0.1));
        let log = engine.log();
        let config = LoopConfig {
            max_time_s: Some(0.5),
            pacing: Pacing::Simulated,
            ..LoopConfig::default()
        };
        let mut simulation = Simulation::<Distance, _>::start(
            engine,
            config,
            ConstantInput::new(DistanceInput { speed: 100.0 }),
            TracingObserver,
        )
        .unwrap();
        let report = simulation.wait().unwrap();
        assert_eq!(report.reason, StopReason::LimitReached);
        assert_eq!(report.steps, 6);
        assert_eq!(simulation.state(), SessionState::Destroyed);
        assert_eq!(log.destroys(), 1);
        assert_eq!(simulation.shutdown().unwrap(), report);
        assert_eq!(log.destroys(), 1);
    }

    #[test]
    fn cancelled_token_destroys_without_stepping() {
        let engine = ScriptedEngine::<Distance>::new(distance_model(0.1));
        let log = engine.log();
        let token = CancelToken::new();
        token.cancel();
        let mut simulation = Simulation::<Distance, _>::start_with_token(
            engine,
            LoopConfig::default(),
            ConstantInput::new(DistanceInput { speed: 1.0 }),
            TracingObserver,
            token,
        )
        .unwrap();
        let report = simulation.wait().unwrap();
        assert_eq!(report.reason, StopReason::Cancelled);
        assert_eq!(report.steps, 0);
        assert_eq!(log.creates(), 1);
        assert_eq!(log.destroys(), 1);
    }

    #[test]
    fn invalid_config_never_creates_engine() {
        let engine = ScriptedEngine::<Distance>::new(distance_model(0.1));
        let log = engine.log();
        let config = LoopConfig {
            timestep_s: 0.0,
            ..LoopConfig::default()
        };
        let result = Simulation::<Distance, _>::start(
            engine,
            config,
            ConstantInput::new(DistanceInput::default()),
            TracingObserver,
        );
        assert!(matches!(result, Err(HostError::Config(_))));
        assert_eq!(log.creates(), 0);
    }

    #[test]
    fn drop_stops_loop_before_destroy() {
        let engine = ScriptedEngine::<Distance>::new(distance_model(0.1))
            .with_step_delay(Duration::from_millis(2));
        let log = engine.log();
        let simulation = Simulation::<Distance, _>::start(
            engine,
            LoopConfig {
                interval_ms: 1,
                ..LoopConfig::default()
            },
            ConstantInput::new(DistanceInput { speed: 1.0 }),
            |_: &StepRecord<'_, Distance>| {},
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        drop(simulation);
        assert_eq!(log.destroys(), 1);
        assert!(!log.updated_after_destroy());
        assert!(!log.has_violations());
    }
}
