//! Host configuration: search directories, the loadable-library extension
//! override, and the log filter, loadable from a JSON file via a small
//! builder.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HostError, HostResult};

/// Which file extension counts as a loadable extension binary. Overridable
/// only for tests; production code should use [`HostConfig::default`]'s
/// platform-derived value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryExtension(pub String);

impl Default for LibraryExtension {
    fn default() -> Self {
        #[cfg(target_os = "windows")]
        {
            LibraryExtension("dll".to_string())
        }
        #[cfg(not(target_os = "windows"))]
        {
            LibraryExtension("so".to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Directories scanned for extension binaries, in the order they will
    /// be searched by extension discovery.
    pub search_dirs: Vec<PathBuf>,

    /// Shared-library file extension to treat as a candidate.
    pub library_extension: LibraryExtension,

    /// `tracing_subscriber::EnvFilter` string used by `init_tracing`, kept
    /// here so it round-trips through the same config file as everything
    /// else.
    pub log_filter: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            library_extension: LibraryExtension::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl HostConfig {
    pub fn from_file(path: impl AsRef<Path>) -> HostResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| HostError::GraphIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| HostError::GraphParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> HostResult<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).expect("HostConfig is always serializable");
        std::fs::write(path, text).map_err(|source| HostError::GraphIo {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fluent builder for assembling a [`HostConfig`].
#[derive(Default)]
pub struct ConfigBuilder {
    config: HostConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: HostConfig::default(),
        }
    }

    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.search_dirs.push(dir.into());
        self
    }

    pub fn library_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.library_extension = LibraryExtension(ext.into());
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    pub fn build(self) -> HostConfig {
        self.config
    }
}
