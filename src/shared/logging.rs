use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the log level.
pub const LOG_LEVEL_ENV_VAR: &str = "TFINSTANCE_LOG_LEVEL";

/// Map a user supplied level to a filter directive, defaulting to info.
pub fn filter_for(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

/// Install the tracing subscriber writing to stderr. `RUST_LOG` wins over
/// the level variable.
pub fn init_logging() {
    let level = std::env::var(LOG_LEVEL_ENV_VAR).unwrap_or_else(|_| "info".to_string());
    let filter = filter_for(&level);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tfinstance={}", filter).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
