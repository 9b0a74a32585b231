//! Shared utilities for integration tests.

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Route tracing output through the test harness.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .with_test_writer()
            .try_init();
    });
}
