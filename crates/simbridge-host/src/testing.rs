//! Deterministic in-process engines for exercising hosts without a native
//! library. Every call crossing the boundary is appended to a shared
//! [`CallLog`], so tests can assert on ordering.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use simbridge_sys::{CrashInput, CrashOutput, DistanceInput, DistanceOutput, ModelVariant};

use crate::boundary::EngineBoundary;
use crate::error::{HostError, StepError};
use crate::handle::EngineHandle;

/// One observed boundary call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Create { handle: usize },
    Update { handle: usize, time_s: f64 },
    Destroy { handle: usize },
    /// `update` with a handle that is not live.
    StaleUpdate { handle: usize },
    /// `destroy` with a handle that is not live.
    InvalidFree { handle: usize },
}

/// Shared, append-only record of boundary calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<EngineCall>>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn creates(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Create { .. }))
    }

    pub fn updates(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Update { .. }))
    }

    pub fn destroys(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Destroy { .. }))
    }

    /// `true` when the engine saw a stale update or an invalid free.
    pub fn has_violations(&self) -> bool {
        self.count(|call| {
            matches!(
                call,
                EngineCall::StaleUpdate { .. } | EngineCall::InvalidFree { .. }
            )
        }) > 0
    }

    /// `true` when some update was issued after the first destroy.
    pub fn updated_after_destroy(&self) -> bool {
        let calls = self.calls.lock();
        let Some(destroyed_at) = calls
            .iter()
            .position(|call| matches!(call, EngineCall::Destroy { .. }))
        else {
            return false;
        };
        calls[destroyed_at..].iter().any(|call| {
            matches!(
                call,
                EngineCall::Update { .. } | EngineCall::StaleUpdate { .. }
            )
        })
    }

    fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn push(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

type ModelFn<V> = Box<
    dyn FnMut(f64, &<V as ModelVariant>::Input) -> Result<<V as ModelVariant>::Output, String>
        + Send,
>;

/// Engine double driven by a closure.
pub struct ScriptedEngine<V: ModelVariant> {
    model: ModelFn<V>,
    log: CallLog,
    live: HashSet<usize>,
    next_handle: usize,
    fail_create: Option<String>,
    step_delay: Option<Duration>,
}

impl<V: ModelVariant> ScriptedEngine<V> {
    pub fn new<F>(model: F) -> Self
    where
        F: FnMut(f64, &V::Input) -> Result<V::Output, String> + Send + 'static,
    {
        Self {
            model: Box::new(model),
            log: CallLog::default(),
            live: HashSet::new(),
            next_handle: 0x1000,
            fail_create: None,
            step_delay: None,
        }
    }

    /// Makes `create` fail as if the native library were unusable.
    pub fn failing_create(mut self, reason: impl Into<String>) -> Self {
        self.fail_create = Some(reason.into());
        self
    }

    /// Blocks every update for `delay`, simulating a slow engine.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Shares an existing log instead of a fresh one.
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl<V: ModelVariant> EngineBoundary<V> for ScriptedEngine<V> {
    fn create(&mut self) -> Result<EngineHandle, HostError> {
        if let Some(reason) = &self.fail_create {
            return Err(HostError::Initialization(reason.clone()));
        }
        let raw = self.next_handle;
        self.next_handle += 0x10;
        self.live.insert(raw);
        self.log.push(EngineCall::Create { handle: raw });
        EngineHandle::from_raw(raw).ok_or(HostError::NullInstance { variant: V::NAME })
    }

    unsafe fn destroy(&mut self, handle: EngineHandle) {
        let raw = handle.into_raw();
        if self.live.remove(&raw) {
            self.log.push(EngineCall::Destroy { handle: raw });
        } else {
            self.log.push(EngineCall::InvalidFree { handle: raw });
        }
    }

    unsafe fn update(
        &mut self,
        handle: &EngineHandle,
        time_s: f64,
        input: &mut V::Input,
    ) -> Result<V::Output, StepError> {
        let raw = handle.as_raw();
        if !self.live.contains(&raw) {
            self.log.push(EngineCall::StaleUpdate { handle: raw });
            return Err(StepError::Engine {
                time_s,
                reason: format!("stale handle {raw:#x}"),
            });
        }
        self.log.push(EngineCall::Update {
            handle: raw,
            time_s,
        });
        if let Some(delay) = self.step_delay {
            thread::sleep(delay);
        }
        (self.model)(time_s, input).map_err(|reason| StepError::Engine { time_s, reason })
    }
}

/// Distance model with a fixed integration step: `distance += speed * timestep_s`.
pub fn distance_model(
    timestep_s: f64,
) -> impl FnMut(f64, &DistanceInput) -> Result<DistanceOutput, String> + Send + 'static {
    let mut distance = 0.0;
    move |_time_s, input| {
        distance += input.speed * timestep_s;
        Ok(DistanceOutput { distance })
    }
}

/// Stateless crash rule: flags when lateral acceleration and speed are both high.
pub fn crash_model(
) -> impl FnMut(f64, &CrashInput) -> Result<CrashOutput, String> + Send + 'static {
    |_time_s, input| {
        let crashed = input.ay.abs() > 6.0 && input.speed > 5.0;
        Ok(CrashOutput {
            crash_flag: if crashed { 1.0 } else { 0.0 },
        })
    }
}
