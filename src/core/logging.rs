//! Logging Module
//!
//! Sets up `tracing` for the rules engine:
//! - A stdout layer (pretty formatted with colors)
//! - An optional JSON file layer with daily rotation
//!
//! The filter comes from `RUST_LOG` when set, otherwise from
//! [`LoggingConfig::level`].

use std::fs;
use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

pub const LOG_FILE_NAME: &str = "ttrpg-rules.log";

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system.
///
/// Returns a `WorkerGuard` when a file layer was installed; keep it alive
/// for the duration of the application so buffered logs are flushed on
/// shutdown. Calling this more than once is harmless: later calls leave the
/// first subscriber in place.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .pretty()
        .with_filter(env_filter(config));

    let (file_layer, guard) = if config.json_file {
        let log_dir = config.log_dir();
        if !log_dir.exists() {
            if let Err(e) = fs::create_dir_all(&log_dir) {
                eprintln!("Failed to create logs directory: {}", e);
            }
        }

        let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_target(true)
            .with_filter(env_filter(config));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            level = %config.level,
            json_file = config.json_file,
            "Logging initialized"
        );
    }

    guard
}

/// Test-friendly subscriber: captured by the test harness, never fails
/// when another test already installed one
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
