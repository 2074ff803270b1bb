//! Logging setup for tether with file output and optional stdout.
//!
//! Logs always go to a file at `warn` level (or higher if a filter is set).
//! Stdout logging is enabled when `TETHER_LOG` or `RUST_LOG` is set, or in debug builds.
//!
//! ## Environment Variables
//!
//! 1. **`TETHER_LOG`** (highest priority) - tether-specific logging control
//! 2. **`RUST_LOG`** - Standard tracing environment variable
//! 3. **Default** - `warn` globally, `info` for tether crates
//!
//! ## Log File Location
//!
//! Default: `<data_local_dir>/tether/logs/tether-<pid>.log`
//! - macOS: `~/Library/Application Support/tether/logs/tether-12345.log`
//! - Linux: `~/.local/share/tether/logs/tether-12345.log`
//!
//! Override with `--log-file <path>`.

use std::{
    env,
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const CRATES: &[&str] = &["tether_text", "tether_bin", "tether_log"];

/// Returned from [`init`]; must be held alive to ensure log file flushing.
pub struct LogGuard {
    _file_guard: WorkerGuard,
    pub log_file: PathBuf,
}

#[derive(Debug, Default)]
pub struct LogConfig {
    pub log_file_path: Option<PathBuf>,
}

/// Initialize logging.
///
/// Filters follow the priority described in the module docs:
/// `TETHER_LOG` > `RUST_LOG` > default settings.
///
/// The returned [`LogGuard`] must be held for the lifetime of the program.
/// Dropping it flushes and stops the background file writer.
pub fn init(config: LogConfig) -> Result<LogGuard, BoxError> {
    let (log_dir, filename) = resolve_log_path(config.log_file_path);
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, &filename);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_filter(create_file_filter());

    let stdout_enabled =
        env::var("TETHER_LOG").is_ok() || env::var("RUST_LOG").is_ok() || cfg!(debug_assertions);
    let stdout_layer = stdout_enabled.then(|| fmt::layer().with_filter(create_filter()));

    Registry::default()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    Ok(LogGuard {
        _file_guard: file_guard,
        log_file: log_dir.join(filename),
    })
}

/// Initialize stdout-only logging for tests.
///
/// Will not fail if called multiple times or if another test already set up logging.
pub fn test() {
    let _ = fmt()
        .with_env_filter(create_filter())
        .with_test_writer()
        .try_init();
}

fn resolve_log_path(override_path: Option<PathBuf>) -> (PathBuf, String) {
    let filename = format!("tether-{}.log", std::process::id());

    if let Some(path) = override_path {
        if path.extension().is_some() {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(filename);
            return (dir.to_path_buf(), name);
        }
        return (path, filename);
    }

    let dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
        .join("logs");
    (dir, filename)
}

/// File filter: the user-specified level if set, otherwise `warn`.
fn create_file_filter() -> EnvFilter {
    if env::var("TETHER_LOG").is_ok() || env::var("RUST_LOG").is_ok() {
        return create_filter();
    }
    EnvFilter::new("warn")
}

fn create_filter() -> EnvFilter {
    if let Ok(tether_log) = env::var("TETHER_LOG") {
        return expand_tether_log(&tether_log);
    }
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }
    EnvFilter::new(directives("info"))
}

/// Expand `TETHER_LOG` into a full filter string.
///
/// - `TETHER_LOG=debug` becomes `warn,tether_text=debug,tether_bin=debug,...`
/// - `TETHER_LOG=tether_text=trace` is used as-is
fn expand_tether_log(tether_log: &str) -> EnvFilter {
    if tether_log.contains('=') || tether_log.contains(':') || tether_log.contains(',') {
        return EnvFilter::new(tether_log);
    }
    EnvFilter::new(directives(tether_log))
}

fn directives(level: &str) -> String {
    let mut filter = String::from("warn");
    for krate in CRATES {
        filter.push_str(&format!(",{krate}={level}"));
    }
    filter
}
