//! Logging and tracing configuration
//!
//! The CLI logs to stderr, and additionally to a plain-text log file so that
//! a failed story can be diagnosed after the fact.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

/// Name of the log file inside the log directory
pub const LOG_FILE_NAME: &str = "stories.log";

/// Default filter directive for the given verbosity
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "android_stories=info,stories=info,warn"
    } else {
        "android_stories=warn,stories=warn,warn"
    }
}

/// Initialize tracing for the CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable, falling back
/// to warnings only, or info for this crate when `verbose` is set (the
/// equivalent of `-v`).
///
/// Returns the appender guard when file logging is active; keep it alive
/// until exit so buffered lines get flushed.
pub fn init_cli(verbose: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    match paths::ensure_log_dir() {
        Ok(Some(log_dir)) => {
            let appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();

            Some(guard)
        }
        Ok(None) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
        Err(e) => {
            eprintln!("Warning: Could not create log directory: {}", e);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

/// Get the path to the log file
pub fn log_file_path() -> Option<std::path::PathBuf> {
    paths::log_dir().map(|d| d.join(LOG_FILE_NAME))
}
