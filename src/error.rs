//! Unified error handling for the host.
//!
//! One `thiserror`-derived enum covering every failure family the host
//! distinguishes: load, registration, connect, I/O, and persistence
//! failures. The core never aborts the process on any of these: each
//! operation surfaces a `Result` (or a `bool` plus a logged diagnostic,
//! where that shape fits better) and lets the caller decide.

use std::path::PathBuf;
use thiserror::Error;

pub type HostResult<T> = Result<T, HostError>;

#[derive(Error, Debug)]
pub enum HostError {
    // -- Load errors (library handle, extension manager) --
    #[error("failed to open library at {path:?}: {reason}")]
    LibraryOpen { path: PathBuf, reason: String },

    #[error("library at {path:?} is missing required export {symbol}")]
    MissingExport { path: PathBuf, symbol: &'static str },

    #[error("CreatePlugin returned null for {path:?}")]
    FactoryReturnedNull { path: PathBuf },

    // -- Port registration errors --
    #[error("CreatePort called before BeginAddon")]
    NoCurrentAddon,

    #[error("duplicate port key {extension}::{port}")]
    DuplicatePort { extension: String, port: String },

    // -- Connection errors (validator, connection table) --
    #[error("unknown port {extension}::{port}")]
    UnknownPort { extension: String, port: String },

    #[error("connect rejected ({reason}): {provider_extension}::{provider_port} -> {receiver_extension}::{receiver_port}")]
    ConnectRejected {
        reason: &'static str,
        provider_extension: String,
        provider_port: String,
        receiver_extension: String,
        receiver_port: String,
    },

    // -- Runtime I/O errors (host services) --
    #[error("read/write attempted on a Direct port handle; use the raw pointer path")]
    DirectHandleIo,

    #[error("no connection found for the given handle")]
    NoConnectionForHandle,

    // -- Persistence errors --
    #[error("I/O error loading/saving graph file {path:?}: {source}")]
    GraphIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed graph file {path:?}: {reason}")]
    GraphParse { path: PathBuf, reason: String },
}
