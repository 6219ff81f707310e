use std::sync::Once;

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_SETUP: Once = Once::new();

/// Enables logging for a test run when `RUST_LOG` is set.
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        start_logging()
    }
}

/// Start logging, with the filter taken from `RUST_LOG`.
///
/// `log` records are forwarded as well, `init` installs the log tracer.
pub fn start_logging() {
    LOG_SETUP.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .finish()
            .init();
    })
}
