//! Structured logging using tracing.
//!
//! Logs to `<home>/logs/turnstile.{date}.log` with daily rotation, keeping 7
//! files. The filter comes from `TURNSTILE_LOG` (default `turnstile=info`).
//! Hook output goes to stdout, so logs never do; if the log file cannot be
//! opened we fall back to stderr.

use fs_err as fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "TURNSTILE_LOG";

const DEFAULT_FILTER: &str = "turnstile=info";

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit so buffered lines are flushed.
/// Calling this twice is harmless; the second call installs nothing.
#[must_use]
pub fn init(home: &Path) -> Option<WorkerGuard> {
    let log_dir = home.join("logs");
    let _ = fs::create_dir_all(&log_dir);

    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match create_file_appender(&log_dir) {
        Ok(file_appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let installed = tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_timer(fmt::time::UtcTime::rfc_3339())
                        .with_ansi(false),
                )
                .try_init();
            installed.ok().map(|()| guard)
        }
        Err(_) => {
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_timer(fmt::time::UtcTime::rfc_3339())
                        .with_ansi(false),
                )
                .try_init();
            None
        }
    }
}

fn create_file_appender(log_dir: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("turnstile")
        .filename_suffix("log")
        .max_log_files(7)
        .build(log_dir)
}
