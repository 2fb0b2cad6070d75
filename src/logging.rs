//! Tracing setup for the `nova-ext` binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "nova_extensions=info,sandbox=info";

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init(verbose: bool) {
    let fallback = if verbose {
        "nova_extensions=debug,sandbox=debug"
    } else {
        DEFAULT_FILTER
    };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
