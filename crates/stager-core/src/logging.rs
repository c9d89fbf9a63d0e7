//! Tracing subscriber setup

use crate::config::LogConfig;
use crate::error::{ConfigError, ConfigResult};
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub const LOG_FILE_NAME: &str = "stager.log";

/// Parse a level name, falling back to `info` for anything unrecognised.
pub fn parse_level(level: &str) -> Level {
    Level::from_str(level.trim()).unwrap_or(Level::INFO)
}

/// Install the global subscriber.
///
/// Logs always go to stderr. When `config.directory` is set they are also
/// written to `<directory>/stager.log`; the returned guard flushes that file
/// writer on drop and must be held for the life of the process.
pub fn init_logging(config: &LogConfig) -> ConfigResult<Option<WorkerGuard>> {
    let level = parse_level(&config.level);

    match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::never(directory, LOG_FILE_NAME);
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            let writer = std::io::stderr.and(file_writer).with_max_level(level);

            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Ok(None)
        }
    }
}
