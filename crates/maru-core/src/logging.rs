//! Tracing subscriber setup.
//!
//! Per-turn context (user, session, intent) travels in spans attached at
//! the pipeline entry points; this module only installs the process-wide
//! subscriber.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, writing compact records to
/// stderr.
///
/// `default_directive` applies when `RUST_LOG` is unset. Later calls
/// keep the first subscriber.
pub fn init_subscriber(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
