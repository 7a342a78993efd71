//! Shared CLI argument types.

use clap::ValueEnum;
use tracing::Level;

/// Log verbosity flag shared by every binary.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Only fatal problems
    Error,
    /// Warnings (default)
    Warn,
    /// Progress information
    Info,
    /// Per-stage diagnostics
    Debug,
    /// Everything
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_conversion() {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }
}
