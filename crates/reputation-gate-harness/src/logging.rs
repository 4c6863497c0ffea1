// crates/reputation-gate-harness/src/logging.rs
// ============================================================================
// Module: Harness Logging
// Description: Tracing subscriber setup for harness consumers.
// Purpose: Route harness lifecycle events into test output.
// Dependencies: tracing-subscriber
// ============================================================================

//! ## Overview
//! Harness components emit `tracing` events (server binds, mode changes,
//! gateway spawn and stop). Test binaries call [`init_test_tracing`] once;
//! `RUST_LOG` overrides the default `info` filter.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Installs a test-writer fmt subscriber; later calls are no-ops.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
