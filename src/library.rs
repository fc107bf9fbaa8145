//! Library Handle: scoped acquisition of a dynamically loaded module.

use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::debug;

/// Owns at most one open `libloading::Library`. Non-copyable by
/// construction (no `Clone` impl); ownership moves with the value.
/// Dropping a `LibraryHandle` closes it, so every control-flow exit -
/// including early returns on failure - ends in exactly one close.
pub struct LibraryHandle {
    path: PathBuf,
    lib: Option<Library>,
}

impl LibraryHandle {
    /// A handle with nothing loaded. `close` on this is a no-op.
    pub fn unopened(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lib: None,
        }
    }

    /// Loads the module at `path`. On failure, `self` stays closed and the
    /// platform-specific reason is returned.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref().to_path_buf();
        match unsafe { Library::new(&path) } {
            Ok(lib) => {
                debug!(path = %path.display(), "opened library");
                Ok(Self {
                    path,
                    lib: Some(lib),
                })
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.lib.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Idempotent: safe to call on an already-closed or never-opened
    /// handle.
    pub fn close(&mut self) {
        if let Some(lib) = self.lib.take() {
            drop(lib);
            debug!(path = %self.path.display(), "closed library");
        }
    }

    /// Resolves a symbol by its C name (including the trailing NUL the
    /// caller must supply, e.g. `b"CreatePlugin\0"`), returning it as `F`.
    ///
    /// # Safety
    /// `F` must exactly match the signature of the symbol named by
    /// `name`; a mismatch is undefined behavior the same way an incorrect
    /// `extern "C"` declaration would be.
    pub unsafe fn get_symbol<F: Copy>(&self, name: &[u8]) -> Option<F> {
        let lib = self.lib.as_ref()?;
        lib.get::<F>(name).ok().map(|sym| *sym)
    }
}

impl Drop for LibraryHandle {
    fn drop(&mut self) {
        self.close();
    }
}
