use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{Layer, filter::FilterFn, prelude::*};

/// Install the process-wide tracing subscriber.
///
/// The level defaults to `TRACE` in debug builds and `INFO` otherwise,
/// and can be overridden through the `LOG_LEVEL` environment variable.
/// Calling this after a subscriber is already installed is a no-op.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    });

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("courier")
                })),
        )
        .try_init();
}
