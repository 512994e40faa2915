//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ChatError, Result};

/// Parse `directive` into an [`EnvFilter`].
pub fn build_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| ChatError::Config(format!("log filter '{}': {}", directive, e)))
}

/// Install the global subscriber. Logs go to stderr so they never interleave
/// with streamed reply text on stdout.
pub fn init(directive: &str) -> Result<()> {
    let filter = build_filter(directive)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| ChatError::Config(format!("logging already initialised: {}", e)))
}
