use observer_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

fn directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive(&config.level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.include_modules)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(directive("DEBUG"), "debug");
        assert_eq!(directive("chatty"), "info");
    }
}
