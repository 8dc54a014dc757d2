//! Structured logging with tracing.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Initialize logging with environment-based filtering.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("onionet=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
