//! Host side of the simbridge engine interface.
//!
//! A native simulation engine is loaded from a shared library, owned by an
//! [`EngineSession`] for exactly one create/destroy cycle, and stepped either
//! directly or from a background [`UpdateLoop`]. Sessions, boundaries and
//! loops are generic over a [`ModelVariant`], so an engine built for one pair
//! of sample layouts can never be fed another's.

pub mod binding;
mod boundary;
mod cancel;
pub mod config;
mod driver;
mod error;
mod handle;
pub mod input;
mod library;
pub mod marshal;
mod pacing;
mod recorder;
mod session;
mod simulation;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use boundary::EngineBoundary;
pub use cancel::CancelToken;
pub use config::{HostConfig, InputConfig, LoopConfig, VariantKind};
pub use driver::{
    LoopHandle, LoopReport, ObserverSet, StepObserver, StepRecord, StopReason, TracingObserver,
    UpdateLoop, WORKER_THREAD_NAME,
};
pub use error::{ConfigError, HostError, MarshalError, StepError};
pub use handle::EngineHandle;
pub use input::{ConfiguredInput, ConstantInput, FeedInput, FeedSender, InputSource, RandomInput};
pub use library::{EngineLibrary, EntryPoints};
pub use pacing::{Pacer, Pacing, RunLimit};
pub use recorder::SampleRecorder;
pub use session::{EngineSession, SessionState};
pub use simulation::Simulation;

/// Re-export the raw ABI for users that need the sample types or entry point
/// signatures.
pub use simbridge_sys as ffi;
pub use simbridge_sys::{Crash, Distance, ModelVariant, Sample, Telemetry};
