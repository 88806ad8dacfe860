//! Structured logging setup.
//!
//! Thin wrapper over `tracing-subscriber`: pick a level and an output
//! format, call [`init_logging`] once at startup. `RUST_LOG` overrides the
//! configured level when set.

use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Most detailed debugging information.
    Trace,
    /// Detailed debugging information.
    Debug,
    /// Important lifecycle events (connects, state transitions).
    Info,
    /// Potential issues (reconnects, dropped frames).
    Warn,
    /// Errors.
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    Pretty,
    /// Single-line compact output.
    Compact,
    /// JSON output for production environments.
    Json,
}

/// Log configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Whether to show the target module path.
    pub show_target: bool,
    /// Whether to show span enter/exit events.
    pub show_span_events: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            show_target: true,
            show_span_events: false,
        }
    }
}

impl LogConfig {
    /// Configuration for development environments.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            show_target: true,
            show_span_events: true,
        }
    }

    /// Configuration for production environments.
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            show_target: true,
            show_span_events: false,
        }
    }

    /// Configuration for test environments.
    pub fn test() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            show_target: false,
            show_span_events: false,
        }
    }
}

fn build_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("eventlink={}", config.level)));

    let span_events = if config.show_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_target(config.show_target)
        .with_span_events(span_events);

    match config.format {
        LogFormat::Pretty => base.pretty().with_filter(env_filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(env_filter).boxed(),
        LogFormat::Json => base.json().with_filter(env_filter).boxed(),
    }
}

/// Initializes the logging system.
///
/// Panics if a global subscriber is already installed; use
/// [`try_init_logging`] where double initialization is possible.
pub fn init_logging(config: &LogConfig) {
    tracing_subscriber::registry()
        .with(build_layer(config))
        .init();
}

/// Attempts to initialize the logging system, ignoring duplicate
/// initialization errors. Suitable for tests.
pub fn try_init_logging(config: &LogConfig) {
    let _ = tracing_subscriber::registry()
        .with(build_layer(config))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_log_config_profiles() {
        let dev = LogConfig::development();
        assert_eq!(dev.level, LogLevel::Debug);
        assert!(dev.show_span_events);

        let prod = LogConfig::production();
        assert_eq!(prod.format, LogFormat::Json);

        let test = LogConfig::test();
        assert_eq!(test.level, LogLevel::Warn);
        assert!(!test.show_target);
    }

    #[test]
    fn test_try_init_logging_is_reentrant() {
        try_init_logging(&LogConfig::test());
        try_init_logging(&LogConfig::test());
    }
}
