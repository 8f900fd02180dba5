//! Logging configuration with file-based output and size-based rotation.
//!
//! Writes logs to `~/.config/marketlens/marketlens.log` (or platform
//! equivalent) with 10 MB rotation. The console only shows warnings unless
//! `DEBUG_LOGGING=1` is set, so log lines do not interleave with REPL output.

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DEBUG_DIRECTIVE: &str = "info,marketlens_core=debug,marketlens_cli=debug";

fn console_filter(debug_logging: bool) -> EnvFilter {
    EnvFilter::new(if debug_logging { DEBUG_DIRECTIVE } else { "warn" })
}

/// Initialize logging: rotating file plus stderr.
///
/// The returned guard must be held for the program lifetime so buffered
/// lines are flushed. `None` means file logging could not be set up and only
/// stderr is active.
pub fn init() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let debug_logging = std::env::var("DEBUG_LOGGING").is_ok();

    let Some(log_dir) = dirs::config_dir().map(|c| c.join("marketlens")) else {
        init_console_only(debug_logging);
        return None;
    };

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {log_dir:?}: {e}, using stderr only");
        init_console_only(debug_logging);
        return None;
    }

    let log_path = log_dir.join("marketlens.log");
    let file_appender = match BasicRollingFileAppender::new(
        &log_path,
        RollingConditionBasic::new().max_size(10 * 1024 * 1024),
        1,
    ) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Failed to create log file at {log_path:?}: {e}");
            init_console_only(debug_logging);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = EnvFilter::new(if debug_logging { DEBUG_DIRECTIVE } else { "info" });
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_filter(file_filter);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_filter(console_filter(debug_logging));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!(log_file = ?log_path, debug_logging, "logging initialized");
    Some(guard)
}

fn init_console_only(debug_logging: bool) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_filter(console_filter(debug_logging));

    tracing_subscriber::registry().with(console_layer).init();
}
