//! Global tracing subscriber.

use tracing_subscriber::EnvFilter;

/// Install the subscriber. `RUST_LOG` overrides the default `info` level.
///
/// # Errors
/// If a global subscriber is already installed.
pub fn init(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("tracing subscriber: {e}"))
}
