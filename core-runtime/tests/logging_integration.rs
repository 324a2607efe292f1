//! Integration tests for logging bootstrap

use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_second_initialization_is_rejected() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("core_sync=debug,sqlx=warn");

    init_logging(config.clone()).expect("first initialization succeeds");
    tracing::info!(target: "core_sync", "logging ready");

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::Config(message)) if message.contains("Failed to initialize logging")));
}
