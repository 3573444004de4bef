pub mod config;
pub mod error;
pub mod handlers;
pub mod request_log;
pub mod request_stats;

mod snapshot;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// Note: This function can only be called once per process. The embedding
/// gateway usually installs its own subscriber instead and skips this.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
