//! Usage: Process-wide tracing setup (stderr + daily rolling file under `<token dir>/logs`).
//!
//! stdout is reserved for the host's stdio transport, so nothing here writes to it.

use crate::infra::config::{Config, DEFAULT_LOG_LEVEL};
use crate::infra::token_store::ensure_private_dir;
use crate::shared::error::AppResult;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_DIR_NAME: &str = "logs";
const LOG_FILE_PREFIX: &str = "puck.log";

/// Keeps the non-blocking file writer alive; dropping it flushes buffered lines.
#[must_use]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

pub(crate) fn filter_directive(level: &str) -> String {
    match level.trim() {
        "" => DEFAULT_LOG_LEVEL.to_string(),
        level => level.to_string(),
    }
}

fn build_filter(level: &str) -> EnvFilter {
    let directive = filter_directive(level);
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("[puck] invalid log level {directive:?} ({err}); using {DEFAULT_LOG_LEVEL}");
        EnvFilter::new(DEFAULT_LOG_LEVEL)
    })
}

pub fn init(config: &Config) -> AppResult<LoggingGuard> {
    let log_dir = config.token_dir().join(LOG_DIR_NAME);
    let (file_layer, guard) = match ensure_private_dir(&log_dir) {
        Ok(()) => {
            let appender = rolling::daily(&log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_thread_ids(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(err) => {
            eprintln!("[puck] file logging disabled: {err}");
            (None, None)
        }
    };

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(build_filter(&config.log_level))
        .with(stderr_layer)
        .with(file_layer);

    // `log` records from dependencies; a second init (tests, embedding hosts) is harmless.
    let _ = tracing_log::LogTracer::init();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("SYSTEM_ERROR: logging already initialized: {e}"))?;

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %filter_directive(&config.log_level),
        "logging initialized"
    );
    Ok(LoggingGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_level_falls_back_to_info() {
        assert_eq!(filter_directive("  "), "info");
        assert_eq!(filter_directive("debug"), "debug");
        assert_eq!(filter_directive(" puck_lib=trace,warn "), "puck_lib=trace,warn");
    }
}
