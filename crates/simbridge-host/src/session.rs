use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use simbridge_sys::ModelVariant;
use tracing::{debug, info};

use crate::boundary::EngineBoundary;
use crate::error::{HostError, StepError};
use crate::handle::EngineHandle;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of one engine session. `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Live,
    Destroyed,
}

/// Owns exactly one engine handle for the duration of a session.
///
/// Validity checks and engine calls happen under one lock, so `step` and
/// `destroy` issued from different threads never overlap and a step can never
/// observe a released handle. Dropping a live session destroys its engine.
pub struct EngineSession<V: ModelVariant, B: EngineBoundary<V>> {
    id: u64,
    inner: Mutex<SessionInner<B>>,
    _variant: PhantomData<fn() -> V>,
}

struct SessionInner<B> {
    boundary: B,
    state: SessionState,
    handle: Option<EngineHandle>,
    steps: u64,
}

impl<V: ModelVariant, B: EngineBoundary<V>> EngineSession<V, B> {
    /// Wraps `boundary` without creating an engine yet.
    pub fn new(boundary: B) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(SessionInner {
                boundary,
                state: SessionState::Uninitialized,
                handle: None,
                steps: 0,
            }),
            _variant: PhantomData,
        }
    }

    /// Creates a session and its engine in one go.
    pub fn open(boundary: B) -> Result<Self, HostError> {
        let session = Self::new(boundary);
        session.create()?;
        Ok(session)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_live(&self) -> bool {
        self.state() == SessionState::Live
    }

    /// Number of successful steps issued so far.
    pub fn steps(&self) -> u64 {
        self.inner.lock().steps
    }

    /// Asks the engine for a new instance.
    ///
    /// Only valid once, from `Uninitialized`. A failed create leaves the
    /// session uninitialised and is never retried here.
    pub fn create(&self) -> Result<(), HostError> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Uninitialized {
            return Err(HostError::InvalidState {
                state: inner.state,
                operation: "create",
            });
        }
        let handle = inner.boundary.create()?;
        info!(session = self.id, variant = V::NAME, ?handle, "engine created");
        inner.handle = Some(handle);
        inner.state = SessionState::Live;
        Ok(())
    }

    /// Releases the engine. Returns `true` only for the call that released it;
    /// later calls are no-ops.
    pub fn destroy(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.state = SessionState::Destroyed;
        let Some(handle) = inner.handle.take() else {
            return false;
        };
        // SAFETY: the session only ever holds the handle its own boundary created.
        unsafe { inner.boundary.destroy(handle) };
        info!(
            session = self.id,
            variant = V::NAME,
            steps = inner.steps,
            "engine destroyed"
        );
        true
    }

    /// Runs one engine update at `time_s`.
    pub fn step(&self, time_s: f64, input: &mut V::Input) -> Result<V::Output, StepError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let handle = match (inner.state, inner.handle.as_ref()) {
            (SessionState::Live, Some(handle)) => handle,
            (SessionState::Uninitialized, _) => return Err(StepError::NotStarted),
            _ => return Err(StepError::Closed),
        };
        // SAFETY: a handle is only reachable while the session is `Live`.
        let output = unsafe { inner.boundary.update(handle, time_s, input) }?;
        inner.steps += 1;
        debug!(session = self.id, time_s, "engine step");
        Ok(output)
    }

    /// Grants read access to the boundary, e.g. to inspect a test double.
    pub fn with_boundary<R>(&self, func: impl FnOnce(&B) -> R) -> R {
        let inner = self.inner.lock();
        func(&inner.boundary)
    }
}

impl<V: ModelVariant, B: EngineBoundary<V>> Drop for EngineSession<V, B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
