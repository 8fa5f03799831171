use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "rust_profile_match=info";

/// Install the global subscriber: `RUST_LOG` (or `default_filter`) plus a fmt layer.
///
/// Returns `false` when a subscriber was already installed, which makes
/// repeated calls from tests harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
