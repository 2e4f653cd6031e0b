use std::fmt;
use std::num::NonZeroUsize;

/// Capability token for one live engine instance.
///
/// The token carries the native address returned by the engine's `new` entry
/// point but cannot be dereferenced, cloned or copied. Destroying an engine
/// consumes its token, so a stale handle cannot be named again. Only the
/// boundaries in this crate can turn an address into a token or read it back.
///
/// ```compile_fail
/// let forged = simbridge_host::EngineHandle::from_raw(0x1000);
/// ```
///
/// ```compile_fail
/// fn leak(handle: &simbridge_host::EngineHandle) -> usize {
///     handle.as_raw()
/// }
/// ```
pub struct EngineHandle {
    raw: NonZeroUsize,
}

impl EngineHandle {
    /// Wraps a raw engine address. Returns `None` for the null sentinel.
    pub(crate) fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(|raw| Self { raw })
    }

    /// Raw address for passing back across the boundary that produced it.
    pub(crate) fn as_raw(&self) -> usize {
        self.raw.get()
    }

    /// Consumes the token, returning the raw address for the final `free` call.
    pub(crate) fn into_raw(self) -> usize {
        self.raw.get()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineHandle({:#x})", self.raw.get())
    }
}
