//! `plughost` — a host process for dynamically loaded extensions that
//! exchange typed data through a typed port graph.
//!
//! An extension is a shared library exporting `CreatePlugin`/`DestroyPlugin`
//! (see [`plughost_abi`]). At startup the host scans its configured search
//! directories ([`manager::ExtensionManager`]), loads every candidate,
//! registers the ports each extension declares ([`registry::PortRegistry`]),
//! connects provider ports to receiver ports after validating their
//! compatibility ([`validator::validate`]), and then drives every
//! extension's `initialize`/`run`/`shutdown` sequence. Connected ports
//! exchange data either by sharing one memory block directly
//! ([`registry::TransportSlot::Direct`]) or by copying bytes through a
//! per-connection buffer ([`registry::TransportSlot::Buffered`]), depending
//! on each port's declared access policy. A graph of ports and connections
//! can be saved to and restored from a text file ([`persistence`]).

pub mod config;
pub mod connection;
pub mod error;
pub mod extension;
pub mod host;
pub mod host_services;
pub mod library;
pub mod logging;
pub mod manager;
pub mod persistence;
pub mod registry;
pub mod validator;

pub use config::{ConfigBuilder, HostConfig};
pub use error::{HostError, HostResult};
pub use extension::Extension;
pub use host::DataflowHost;
pub use host_services::{ExtensionContext, PortGraph};
pub use manager::ExtensionManager;
pub use registry::{PortKey, PortRegistry};
