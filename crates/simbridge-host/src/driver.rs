//! Periodic update loop.
//!
//! Each iteration refreshes the input, issues one step, reports the output,
//! advances simulated time by the timestep and then pauses according to the
//! configured [`Pacing`](crate::Pacing). Cancellation is checked before every
//! step and interrupts the pause.

use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use simbridge_sys::ModelVariant;
use tracing::{debug, info, warn};

use crate::boundary::EngineBoundary;
use crate::cancel::CancelToken;
use crate::config::LoopConfig;
use crate::error::{HostError, StepError};
use crate::input::InputSource;
use crate::marshal;
use crate::pacing::Pacer;
use crate::session::EngineSession;

pub const WORKER_THREAD_NAME: &str = "simbridge-update-loop";

/// One completed step as seen by observers.
#[derive(Debug)]
pub struct StepRecord<'a, V: ModelVariant> {
    pub iteration: u64,
    pub time_s: f64,
    pub input: &'a V::Input,
    pub output: &'a V::Output,
}

/// Receives loop results. Runs on the loop thread.
pub trait StepObserver<V: ModelVariant>: Send {
    fn on_step(&mut self, record: &StepRecord<'_, V>);

    fn on_failure(&mut self, _iteration: u64, _error: &StepError) {}

    fn on_finish(&mut self, _report: &LoopReport) {}
}

impl<V, F> StepObserver<V> for F
where
    V: ModelVariant,
    F: FnMut(&StepRecord<'_, V>) + Send,
{
    fn on_step(&mut self, record: &StepRecord<'_, V>) {
        self(record)
    }
}

/// Logs every output sample through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl<V: ModelVariant> StepObserver<V> for TracingObserver {
    fn on_step(&mut self, record: &StepRecord<'_, V>) {
        info!(
            variant = V::NAME,
            iteration = record.iteration,
            time_s = record.time_s,
            output = %marshal::describe(record.output),
            "step"
        );
    }

    fn on_finish(&mut self, report: &LoopReport) {
        info!(
            variant = V::NAME,
            steps = report.steps,
            failed = report.failed_steps,
            reason = ?report.reason,
            "update loop finished"
        );
    }
}

/// Fans results out to several observers, in insertion order.
pub struct ObserverSet<V: ModelVariant> {
    observers: Vec<Box<dyn StepObserver<V>>>,
}

impl<V: ModelVariant> ObserverSet<V> {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn with(mut self, observer: impl StepObserver<V> + 'static) -> Self {
        self.push(observer);
        self
    }

    pub fn push(&mut self, observer: impl StepObserver<V> + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl<V: ModelVariant> Default for ObserverSet<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ModelVariant> StepObserver<V> for ObserverSet<V> {
    fn on_step(&mut self, record: &StepRecord<'_, V>) {
        for observer in &mut self.observers {
            observer.on_step(record);
        }
    }

    fn on_failure(&mut self, iteration: u64, error: &StepError) {
        for observer in &mut self.observers {
            observer.on_failure(iteration, error);
        }
    }

    fn on_finish(&mut self, report: &LoopReport) {
        for observer in &mut self.observers {
            observer.on_finish(report);
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    LimitReached,
    /// The session was destroyed or never created.
    SessionClosed,
}

/// Summary returned when the loop stops.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopReport {
    /// Steps that produced an accepted output.
    pub steps: u64,
    pub failed_steps: u64,
    /// Simulated time the next step would have used.
    pub final_time_s: f64,
    pub reason: StopReason,
}

/// Drives one session with a given input source and observer.
pub struct UpdateLoop<V: ModelVariant, S, O> {
    config: LoopConfig,
    source: S,
    observer: O,
    input: V::Input,
    _variant: PhantomData<fn() -> V>,
}

impl<V, S, O> UpdateLoop<V, S, O>
where
    V: ModelVariant,
    S: InputSource<V::Input>,
    O: StepObserver<V>,
{
    pub fn new(config: LoopConfig, source: S, observer: O) -> Self {
        Self {
            config,
            source,
            observer,
            input: V::Input::default(),
            _variant: PhantomData,
        }
    }

    /// Input the source sees before the first refresh.
    pub fn with_initial_input(mut self, input: V::Input) -> Self {
        self.input = input;
        self
    }

    /// Runs on the calling thread until cancelled, the run limit is reached
    /// or the session closes.
    pub fn run<B>(mut self, session: &EngineSession<V, B>, token: &CancelToken) -> LoopReport
    where
        B: EngineBoundary<V>,
    {
        let limit = self.config.run_limit();
        let mut pacer = Pacer::new(self.config.pacing, self.config.interval());
        let mut iteration: u64 = 0;
        let mut steps: u64 = 0;
        let mut failed_steps: u64 = 0;
        let mut time_s = self.config.start_time_s;

        info!(
            session = session.id(),
            variant = V::NAME,
            timestep_s = self.config.timestep_s,
            pacing = ?self.config.pacing,
            limit = ?limit.seconds(),
            "update loop started"
        );

        let reason = loop {
            if token.is_cancelled() {
                break StopReason::Cancelled;
            }
            if !limit.allows(time_s) {
                break StopReason::LimitReached;
            }

            pacer.begin();
            self.source.refresh(time_s, &mut self.input);
            match self.step(session, time_s) {
                Ok(output) => {
                    steps += 1;
                    self.observer.on_step(&StepRecord {
                        iteration,
                        time_s,
                        input: &self.input,
                        output: &output,
                    });
                }
                Err(err) if err.is_terminal() => {
                    debug!(session = session.id(), %err, "session closed under the loop");
                    break StopReason::SessionClosed;
                }
                Err(err) => {
                    failed_steps += 1;
                    warn!(session = session.id(), iteration, time_s, %err, "step failed");
                    self.observer.on_failure(iteration, &err);
                }
            }

            iteration += 1;
            time_s = self.config.start_time_s + iteration as f64 * self.config.timestep_s;
            if !limit.allows(time_s) {
                break StopReason::LimitReached;
            }
            if !pacer.wait(token) {
                break StopReason::Cancelled;
            }
        };

        let report = LoopReport {
            steps,
            failed_steps,
            final_time_s: time_s,
            reason,
        };
        self.observer.on_finish(&report);
        report
    }

    fn step<B>(&mut self, session: &EngineSession<V, B>, time_s: f64) -> Result<V::Output, StepError>
    where
        B: EngineBoundary<V>,
    {
        let output = session.step(time_s, &mut self.input)?;
        if self.config.reject_non_finite {
            if let Some(field) = marshal::first_non_finite(&output) {
                return Err(StepError::NonFinite { time_s, field });
            }
        }
        Ok(output)
    }
}

impl<V, S, O> UpdateLoop<V, S, O>
where
    V: ModelVariant,
    S: InputSource<V::Input> + 'static,
    O: StepObserver<V> + 'static,
{
    /// Runs the loop on a dedicated worker thread.
    pub fn spawn<B>(
        self,
        session: Arc<EngineSession<V, B>>,
        token: CancelToken,
    ) -> Result<LoopHandle, HostError>
    where
        B: EngineBoundary<V> + 'static,
    {
        let worker_token = token.clone();
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || self.run(&session, &worker_token))
            .map_err(HostError::Spawn)?;
        Ok(LoopHandle {
            token,
            worker: Some(worker),
        })
    }
}

/// Control over a spawned update loop. Dropping it cancels and joins.
pub struct LoopHandle {
    token: CancelToken,
    worker: Option<JoinHandle<LoopReport>>,
}

impl LoopHandle {
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Waits for the loop to stop on its own.
    pub fn join(mut self) -> Result<LoopReport, HostError> {
        self.join_worker()
    }

    /// Cancels the loop and waits for it.
    pub fn stop(mut self) -> Result<LoopReport, HostError> {
        self.token.cancel();
        self.join_worker()
    }

    fn join_worker(&mut self) -> Result<LoopReport, HostError> {
        let worker = self.worker.take().ok_or(HostError::WorkerPanicked)?;
        worker.join().map_err(|_| HostError::WorkerPanicked)
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.join() {
                tracing::error!(?err, "failed to join update loop thread");
            }
        }
    }
}
