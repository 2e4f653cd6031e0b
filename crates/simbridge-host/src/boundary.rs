use simbridge_sys::ModelVariant;

use crate::error::{HostError, StepError};
use crate::handle::EngineHandle;

/// The three entry points every engine exposes to its host.
///
/// Implemented by [`EngineLibrary`](crate::EngineLibrary) for native engines
/// and by the scripted doubles behind the `testing` feature. Callers never
/// invoke a boundary directly; [`EngineSession`](crate::EngineSession) owns it and
/// enforces the handle lifecycle.
///
/// Releasing or stepping a handle is `unsafe`; only a session, which holds
/// the single handle its boundary created, can uphold that contract.
///
/// ```compile_fail
/// use simbridge_host::{Distance, EngineBoundary};
///
/// fn release<B: EngineBoundary<Distance>>(boundary: &mut B) {
///     let handle = boundary.create().unwrap();
///     boundary.destroy(handle);
/// }
/// ```
pub trait EngineBoundary<V: ModelVariant>: Send {
    /// Allocates a new engine instance.
    fn create(&mut self) -> Result<EngineHandle, HostError>;

    /// Releases every resource held by `handle`.
    ///
    /// # Safety
    ///
    /// `handle` must have been returned by `create` on this same boundary.
    unsafe fn destroy(&mut self, handle: EngineHandle);

    /// Runs one blocking update. No engine work continues after it returns.
    ///
    /// # Safety
    ///
    /// `handle` must have been returned by `create` on this same boundary and
    /// not yet passed to `destroy`.
    unsafe fn update(
        &mut self,
        handle: &EngineHandle,
        time_s: f64,
        input: &mut V::Input,
    ) -> Result<V::Output, StepError>;
}
