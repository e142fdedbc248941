//! Tracing initialisation for the `datasquad` binary.
//!
//! `RUST_LOG` wins over the level passed in. Only the first successful call
//! installs a subscriber; the global default cannot be replaced afterwards.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Returns `false` if one was already set.
///
/// * `json`: newline-delimited JSON, one object per event, for log shippers.
/// * `level`: default verbosity when `RUST_LOG` is unset or invalid.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.is_ok()
}
