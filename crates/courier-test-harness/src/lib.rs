//! Courier Test Harness
//!
//! Shared test utilities for Courier crates: a wiremock-backed HTTP server
//! with canned responses, and one-time tracing setup.

pub mod network;

pub use network::{responses, MockBuilder, MockSetup, TestHttpServer};

use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests. Safe to call from every test.
pub fn init() {
    static INIT: Lazy<()> = Lazy::new(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,courier=debug,courier_http=debug"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .try_init()
            .ok();
    });

    Lazy::force(&INIT);
}
