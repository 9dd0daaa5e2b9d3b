use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with a level name taken from configuration
/// (`trace`, `debug`, `info`, `warn`, `error`, `off`).
///
/// Unknown names fall back to `info`. `RUST_LOG` still wins over the
/// configured level when it is set.
pub fn init_with_level(level: &str) {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    initialize_tracing(level);
}

/// Initialize tracing subscriber with default configuration.
fn initialize_tracing(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        "" | "compact" => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
        other => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_filter(env_filter)
                .boxed();
            tracing_subscriber::registry().with(layer).init();
            warn!("Unknown RUST_LOG_FORMAT {other:?}, using compact output");
            return;
        }
    };

    tracing_subscriber::registry().with(log_layer).init();
}
