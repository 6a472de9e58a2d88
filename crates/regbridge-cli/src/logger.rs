//! Minimal stderr backend for the `log` facade.

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

/// Installs a [`Logger`] as the global logger.
///
/// # Errors
///
/// Returns [`SetLoggerError`] when a logger is already installed.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(Logger { level })).map(|()| log::set_max_level(level))
}

/// Writes records from this workspace's crates to stderr.
#[derive(Debug, Clone, Copy)]
pub struct Logger {
    /// Most verbose level written.
    pub level: LevelFilter,
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level && is_workspace_target(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", format_record(record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

fn is_workspace_target(target: &str) -> bool {
    match target.split("::").next() {
        Some("regbridge" | "regbridge_cli" | "regbridge_core" | "") | None => true,
        Some(_) => false,
    }
}

fn format_record(level: Level, args: &std::fmt::Arguments<'_>) -> String {
    format!("{} - {args}", level.as_str().to_ascii_lowercase())
}
