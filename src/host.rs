//! Top-level façade: wires the extension manager, the port graph (registry
//! + connection table), and graph persistence into one control-flow
//! sequence — discover, register ports, connect, run, persist.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::config::HostConfig;
use crate::error::HostResult;
use crate::host_services::PortGraph;
use crate::manager::ExtensionManager;
use crate::persistence;
use crate::registry::PortKey;

pub struct DataflowHost {
    config: HostConfig,
    manager: ExtensionManager,
    graph: Rc<RefCell<PortGraph>>,
}

impl DataflowHost {
    pub fn new(config: HostConfig) -> Self {
        let mut manager = ExtensionManager::new();
        for dir in &config.search_dirs {
            manager.add_search_dir(dir);
        }
        Self {
            config,
            manager,
            graph: Rc::new(RefCell::new(PortGraph::new())),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Scans and loads every candidate extension, then immediately
    /// registers the ports each one reports.
    pub fn discover(&mut self) -> HostResult<bool> {
        let loaded = self.manager.scan_and_load(&self.config.library_extension)?;
        self.manager.discover_ports_for_all(&self.graph);
        Ok(loaded)
    }

    pub fn connect(&self, provider: PortKey, receiver: PortKey) -> HostResult<()> {
        self.graph.borrow_mut().connect(provider, receiver)
    }

    /// Runs every loaded extension's `initialize`/`run`/`shutdown`
    /// sequence, in load order.
    pub fn run_all(&self) {
        self.manager.run_all(&self.graph);
    }

    pub fn unload_all(&mut self) {
        self.manager.unload_all();
        self.graph.borrow_mut().clear();
    }

    pub fn save_graph(&self, path: impl AsRef<Path>) -> HostResult<()> {
        persistence::save_to_file(&self.graph.borrow(), path)
    }

    pub fn load_graph(&self, path: impl AsRef<Path>) -> HostResult<()> {
        persistence::load_from_file(&mut self.graph.borrow_mut(), path)
    }

    pub fn port_count(&self) -> usize {
        self.graph.borrow().registry.len()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.borrow().connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    #[test]
    fn discover_with_no_search_dirs_reports_nothing_loaded() {
        let mut host = DataflowHost::new(ConfigBuilder::new().build());
        let loaded = host.discover().unwrap();
        assert!(!loaded);
        assert_eq!(host.port_count(), 0);
    }

    #[test]
    fn save_and_load_graph_round_trips_through_an_empty_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.pm");
        let host = DataflowHost::new(ConfigBuilder::new().build());
        host.save_graph(&path).unwrap();
        host.load_graph(&path).unwrap();
        assert_eq!(host.port_count(), 0);
        assert_eq!(host.connection_count(), 0);
    }
}
