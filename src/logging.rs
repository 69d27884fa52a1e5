//! Tracing setup
//!
//! Debug builds log to stderr. Release builds log to a daily rolling file in
//! `<data dir>/logs` so output never interleaves with the terminal UI.

use std::path::Path;
use tracing::level_filters::LevelFilter;

/// Install the global subscriber. Calling it twice is harmless.
#[cfg_attr(debug_assertions, allow(unused_variables))]
pub fn init_logging(data_dir: &Path) -> anyhow::Result<()> {
    let level = resolve_log_level();

    #[cfg(debug_assertions)]
    {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        use anyhow::Context;

        let log_dir = data_dir.join("logs");
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;
        let file_appender = tracing_appender::rolling::daily(&log_dir, "mole");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Logging lasts until process exit
        std::mem::forget(guard);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(non_blocking)
            .try_init();
    }

    tracing::info!("Mole core v{} logging at {}", crate::VERSION, level);
    Ok(())
}

/// Map `RUST_LOG` onto a level, defaulting to info
pub fn resolve_log_level() -> LevelFilter {
    match std::env::var("RUST_LOG") {
        Ok(val) => parse_level(&val),
        Err(_) => LevelFilter::INFO,
    }
}

fn parse_level(val: &str) -> LevelFilter {
    match val.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}
