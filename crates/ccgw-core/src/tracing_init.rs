//! Tracing/logging initialization for the gateway binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- used when `RUST_LOG` is not set
///   (e.g. `"ccgw_daemon=info,tower_http=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Default filter string for a crate at the given level.
pub fn default_filter(crate_name: &str, level: &str) -> String {
    format!("{crate_name}={level},ccgw_core={level},tower_http={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_http_layer() {
        assert_eq!(
            default_filter("ccgw_daemon", "debug"),
            "ccgw_daemon=debug,ccgw_core=debug,tower_http=debug"
        );
    }
}
