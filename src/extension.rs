//! Extension Record: one loaded extension, owned exclusively by the
//! extension manager. Bundles the library, the factory/destroyer pair
//! used to create and destroy its instance (the two must always be paired,
//! since destroying an instance with a destroyer from a different library
//! is undefined), and the live instance pointer.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use plughost_abi::{
    CreatePluginFn, DestroyPluginFn, HostServicesHandle, PluginHeader, PortDescriptor,
    CREATE_PLUGIN_SYMBOL, DESTROY_PLUGIN_SYMBOL,
};

use crate::error::HostError;
use crate::library::LibraryHandle;

/// The extension's name for `PortKey` purposes: the loaded file's stem.
pub fn extension_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

pub struct Extension {
    path: PathBuf,
    name: String,
    library: LibraryHandle,
    destroy_fn: DestroyPluginFn,
    instance: *mut c_void,
}

impl Extension {
    /// Opens the library, resolves the two required exports, and invokes
    /// the factory. Any failure rolls back every resource acquired
    /// so far (closes the library, never records a half-built instance).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, HostError> {
        let path = path.into();
        let library = LibraryHandle::open(&path).map_err(|reason| HostError::LibraryOpen {
            path: path.clone(),
            reason,
        })?;

        let create_fn: CreatePluginFn = unsafe { library.get_symbol(CREATE_PLUGIN_SYMBOL) }
            .ok_or_else(|| HostError::MissingExport {
                path: path.clone(),
                symbol: "CreatePlugin",
            })?;
        let destroy_fn: DestroyPluginFn = unsafe { library.get_symbol(DESTROY_PLUGIN_SYMBOL) }
            .ok_or_else(|| HostError::MissingExport {
                path: path.clone(),
                symbol: "DestroyPlugin",
            })?;

        let instance = unsafe { create_fn() };
        if instance.is_null() {
            return Err(HostError::FactoryReturnedNull { path });
        }

        let name = extension_name_from_path(&path);
        tracing::info!(%name, path = %path.display(), "loaded extension");

        Ok(Self {
            path,
            name,
            library,
            destroy_fn,
            instance,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn header(&self) -> &PluginHeader {
        unsafe { &*(self.instance as *const PluginHeader) }
    }

    pub fn port_descriptors(&self) -> Vec<PortDescriptor> {
        let header = self.header();
        let mut len = 0usize;
        let raw = unsafe { ((*header.vtable).get_port_descriptors)(self.instance, &mut len) };
        if raw.is_null() || len == 0 {
            return Vec::new();
        }
        let slice = unsafe { std::slice::from_raw_parts(raw, len) };
        slice
            .iter()
            .map(|d| unsafe { d.to_owned_descriptor() })
            .collect()
    }

    pub fn initialize(&self, services: HostServicesHandle) {
        let header = self.header();
        unsafe { ((*header.vtable).initialize)(self.instance, services) };
    }

    pub fn run(&self) {
        let header = self.header();
        unsafe { ((*header.vtable).run)(self.instance) };
    }

    pub fn shutdown(&self) {
        let header = self.header();
        unsafe { ((*header.vtable).shutdown)(self.instance) };
    }
}

impl Drop for Extension {
    fn drop(&mut self) {
        if !self.instance.is_null() {
            // Pairs the destroyer resolved from this same library with the
            // instance its factory created; the library is only closed
            // afterwards, by `LibraryHandle::drop`.
            unsafe { (self.destroy_fn)(self.instance) };
            self.instance = std::ptr::null_mut();
        }
        self.library.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_name_uses_file_stem() {
        assert_eq!(
            extension_name_from_path(Path::new("/opt/ext/libfoo.so")),
            "libfoo"
        );
    }

    #[test]
    fn load_nonexistent_library_is_load_soft_error() {
        let err = Extension::load("/nonexistent/ext.so").unwrap_err();
        assert!(matches!(err, HostError::LibraryOpen { .. }));
    }
}
