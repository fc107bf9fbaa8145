//! Extension Manager: discovers candidate libraries under the configured
//! search directories, loads them, and drives every loaded extension's
//! `initialize`/`run`/`shutdown` sequence in load order.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::cell::RefCell;

use crate::config::LibraryExtension;
use crate::error::HostResult;
use crate::extension::Extension;
use crate::host_services::{ExtensionContext, PortGraph};

#[derive(Default)]
pub struct ExtensionManager {
    search_dirs: Vec<PathBuf>,
    extensions: Vec<Extension>,
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_search_dir(&mut self, dir: impl Into<PathBuf>) {
        self.search_dirs.push(dir.into());
    }

    pub fn clear_search_dirs(&mut self) {
        self.search_dirs.clear();
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// Walks `search_dirs` in the order they were added, collects candidate
    /// files matching `library_extension`, sorts and dedupes them
    /// lexicographically by absolute path, then attempts `Extension::load`
    /// on each in turn. A candidate that fails to load is logged and
    /// skipped — one bad extension never aborts the scan. Returns
    /// `Ok(true)` iff at least one extension loaded.
    pub fn scan_and_load(&mut self, library_extension: &LibraryExtension) -> HostResult<bool> {
        let mut candidates = self.collect_candidates(library_extension);
        candidates.sort();
        candidates.dedup();

        let mut loaded_any = false;
        for path in candidates {
            match Extension::load(&path) {
                Ok(extension) => {
                    loaded_any = true;
                    self.extensions.push(extension);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to load extension");
                }
            }
        }

        if !loaded_any {
            tracing::warn!("no extensions loaded from any configured search directory");
        }
        Ok(loaded_any)
    }

    fn collect_candidates(&self, library_extension: &LibraryExtension) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in &self.search_dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                tracing::warn!(dir = %dir.display(), "search directory unreadable, skipping");
                continue;
            };
            for entry in entries.flatten() {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if !file_type.is_file() {
                    continue;
                }
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(library_extension.0.as_str()) {
                    if let Ok(absolute) = path.canonicalize() {
                        found.push(absolute);
                    } else {
                        found.push(path);
                    }
                }
            }
        }
        found
    }

    /// `BeginAddon` + `CreatePort` for every port every loaded extension
    /// reports, in load order. A single extension's
    /// duplicate-port failures are logged and do not stop the rest.
    pub fn discover_ports_for_all(&self, graph: &Rc<RefCell<PortGraph>>) {
        for extension in &self.extensions {
            let mut g = graph.borrow_mut();
            g.registry.begin_addon(extension.name());
            for descriptor in extension.port_descriptors() {
                if let Err(err) = g.registry.create_port(descriptor) {
                    tracing::warn!(
                        extension = extension.name(),
                        error = %err,
                        "port registration rejected"
                    );
                }
            }
        }
    }

    /// Drives every loaded extension's full `initialize` -> `run` ->
    /// `shutdown` sequence, in load order, each against its own
    /// [`ExtensionContext`] bound to the shared graph.
    pub fn run_all(&self, graph: &Rc<RefCell<PortGraph>>) {
        for extension in &self.extensions {
            let ctx = ExtensionContext::new(extension.name(), graph.clone());
            tracing::info!(extension = extension.name(), "initializing extension");
            extension.initialize(ctx.handle());
            tracing::info!(extension = extension.name(), "running extension");
            extension.run();
            tracing::info!(extension = extension.name(), "shutting down extension");
            extension.shutdown();
        }
    }

    /// Drops every loaded extension, in load order; each `Extension::drop`
    /// pairs its destroyer with its instance before closing its library.
    pub fn unload_all(&mut self) {
        self.extensions.clear();
    }
}
