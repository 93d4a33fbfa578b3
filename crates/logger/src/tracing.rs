use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{
    Layer, Registry, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Install the global subscriber at INFO unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    init_tracing_with_level(LevelFilter::INFO);
}

/// Install the global subscriber with a custom default level.
///
/// `RUST_LOG` directives still win over `level`. Set `RUST_LOG_FORMAT=json`
/// for one JSON object per line.
pub fn init_tracing_with_level(level: LevelFilter) {
    if let Err(error) = build(level).try_init() {
        eprintln!("tracing subscriber was already installed: {error}");
    }
}

/// Like [`init_tracing`], but quiet when a subscriber already exists.
/// Meant for tests, where many cases race to install one.
pub fn try_init_tracing() {
    let _ = build(LevelFilter::DEBUG).try_init();
}

fn build(level: LevelFilter) -> impl SubscriberInitExt {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT")
        .inspect_err(|error| {
            warn!("Failed to read RUST_LOG_FORMAT, falling back to default: {error}")
        })
        .unwrap_or_default();

    let log_layer: Box<dyn Layer<Registry> + Send + Sync> = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_filter(env_filter)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(log_layer)
}
