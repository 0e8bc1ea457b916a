pub mod ai;
pub mod calendar;
pub mod canvas;
pub mod config;
pub mod context;
pub mod debounce;
#[cfg(feature = "desktop")]
mod desktop;
pub mod errors;
pub mod events;
pub mod export;
pub mod fs;
pub mod models;
pub mod vault;

#[cfg(feature = "desktop")]
pub use desktop::run;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// JSON logs to `<log dir>/memoura.log`, rotated daily. Filter comes from
/// `RUST_LOG`, defaulting to `info`.
pub fn init_tracing(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "memoura.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
