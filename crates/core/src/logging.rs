//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggerConfig};

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `config.log_level`. Returns `false` when a
/// subscriber was already installed.
pub fn init(config: &LoggerConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggerConfig::default();
        let first = init(&config);
        // A second install never succeeds, whoever installed first
        assert!(!init(&config) || !first);
    }
}
