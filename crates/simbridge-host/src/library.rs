use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use simbridge_sys::{
    AppInterface, AppInterfaceFreeFn, AppInterfaceNewFn, AppInterfaceUpdateFn, ModelVariant,
    DEFAULT_SYMBOL_PREFIX, FREE_SUFFIX, NEW_SUFFIX, UPDATE_SUFFIX,
};

use crate::binding;
use crate::boundary::EngineBoundary;
use crate::error::{HostError, StepError};
use crate::handle::EngineHandle;

/// Names of the exported engine entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoints {
    pub new: String,
    pub free: String,
    pub update: String,
}

impl EntryPoints {
    /// `<prefix>_new`, `<prefix>_free` and `<prefix>_update`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            new: format!("{prefix}{NEW_SUFFIX}"),
            free: format!("{prefix}{FREE_SUFFIX}"),
            update: format!("{prefix}{UPDATE_SUFFIX}"),
        }
    }
}

impl Default for EntryPoints {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_SYMBOL_PREFIX)
    }
}

/// A native engine built for model variant `V`, resolved from a shared library.
pub struct EngineLibrary<V: ModelVariant> {
    path: PathBuf,
    // Keeps the code behind the function pointers mapped.
    _library: Arc<Library>,
    new_fn: AppInterfaceNewFn,
    free_fn: AppInterfaceFreeFn,
    update_fn: AppInterfaceUpdateFn<V::Input, V::Output>,
    _variant: PhantomData<fn() -> V>,
}

impl<V: ModelVariant> EngineLibrary<V> {
    /// Loads (or reuses) the library at `path` and resolves its entry points.
    ///
    /// # Safety
    /// The library must export `entry` with the signatures declared in
    /// `simbridge_sys`, and its `update` must take and return the sample
    /// layouts of `V`. Nothing in a shared object lets the host verify this.
    pub unsafe fn load(path: impl AsRef<Path>, entry: &EntryPoints) -> Result<Self, HostError> {
        let path = path.as_ref();
        let library = binding::acquire(path)?;
        Self::resolve(path.to_path_buf(), library, entry)
    }

    unsafe fn resolve(
        path: PathBuf,
        library: Arc<Library>,
        entry: &EntryPoints,
    ) -> Result<Self, HostError> {
        let new_fn = *library
            .get::<AppInterfaceNewFn>(entry.new.as_bytes())
            .map_err(|_| HostError::missing_entry(path.clone(), &entry.new))?;
        let free_fn = *library
            .get::<AppInterfaceFreeFn>(entry.free.as_bytes())
            .map_err(|_| HostError::missing_entry(path.clone(), &entry.free))?;
        let update_fn = *library
            .get::<AppInterfaceUpdateFn<V::Input, V::Output>>(entry.update.as_bytes())
            .map_err(|_| HostError::missing_entry(path.clone(), &entry.update))?;

        tracing::debug!(
            path = %path.display(),
            variant = V::NAME,
            new = %entry.new,
            "resolved engine entry points"
        );

        Ok(Self {
            path,
            _library: library,
            new_fn,
            free_fn,
            update_fn,
            _variant: PhantomData,
        })
    }

    /// Path to the engine's dynamic library.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<V: ModelVariant> EngineBoundary<V> for EngineLibrary<V> {
    fn create(&mut self) -> Result<EngineHandle, HostError> {
        let app = unsafe { (self.new_fn)() };
        EngineHandle::from_raw(app as usize).ok_or(HostError::NullInstance { variant: V::NAME })
    }

    unsafe fn destroy(&mut self, handle: EngineHandle) {
        let app = handle.into_raw() as *mut AppInterface;
        (self.free_fn)(app)
    }

    unsafe fn update(
        &mut self,
        handle: &EngineHandle,
        time_s: f64,
        input: &mut V::Input,
    ) -> Result<V::Output, StepError> {
        let app = handle.as_raw() as *mut AppInterface;
        Ok((self.update_fn)(app, time_s, input as *mut V::Input))
    }
}

impl<V: ModelVariant> fmt::Debug for EngineLibrary<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLibrary")
            .field("path", &self.path)
            .field("variant", &V::NAME)
            .finish()
    }
}
