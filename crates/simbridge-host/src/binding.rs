//! Process-wide registry of loaded engine libraries.
//!
//! Each library path is loaded at most once while any session uses it. The
//! registry only holds weak references: the library is unloaded when the last
//! [`EngineLibrary`](crate::EngineLibrary) built from it is dropped, which is
//! the single teardown path for native code.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use libloading::Library;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::HostError;

static LIBRARIES: Lazy<Mutex<HashMap<PathBuf, Weak<Library>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Returns the shared library loaded from `path`, loading it on first use.
///
/// # Safety
/// Loading runs the library's initialisation routines. The caller must trust
/// the binary at `path`.
pub unsafe fn acquire(path: &Path) -> Result<Arc<Library>, HostError> {
    if !path.exists() {
        return Err(HostError::MissingBinary(path.to_path_buf()));
    }
    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    let mut libraries = LIBRARIES.lock();
    libraries.retain(|_, library| library.strong_count() > 0);
    if let Some(library) = libraries.get(&key).and_then(Weak::upgrade) {
        debug!(path = %key.display(), "reusing loaded engine library");
        return Ok(library);
    }

    let library = Arc::new(Library::new(&key)?);
    info!(path = %key.display(), "loaded engine library");
    libraries.insert(key, Arc::downgrade(&library));
    Ok(library)
}

/// Whether a library loaded from `path` is still resident.
pub fn is_loaded(path: &Path) -> bool {
    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    LIBRARIES
        .lock()
        .get(&key)
        .map(|library| library.strong_count() > 0)
        .unwrap_or(false)
}

/// Number of libraries currently resident.
pub fn loaded_count() -> usize {
    LIBRARIES
        .lock()
        .values()
        .filter(|library| library.strong_count() > 0)
        .count()
}
