//! Logging and tracing utilities
//!
//! Structured logging uses the `tracing` crate throughout the parsers.
//! This module only hosts the subscriber bootstrap for binaries and
//! tests that want sensible defaults.

use std::sync::atomic::{AtomicBool, Ordering};

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the default tracing subscriber
///
/// Safe to call more than once; only the first call installs anything.
/// The filter honors `RUST_LOG` and defaults to `warn,iso20022=info`.
pub fn init_default() {
    if TRACING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
        .is_ok()
    {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,iso20022=info"));

        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}
