//! Injectable diagnostic stream.
//!
//! The core never writes to stdio directly: every diagnostic is a
//! `tracing` event instead, so the core stays testable silently. Tests can
//! run with no subscriber installed at all, in which case these events
//! are cheap no-ops.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing_subscriber::fmt` subscriber reading its filter from
/// `PLUGHOST_LOG` (falling back to `info`). Intended for binaries that embed
/// the host; library code and tests should not call this.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("PLUGHOST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
