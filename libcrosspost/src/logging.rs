//! Logging setup shared by the library's callers
//!
//! The library itself only emits `tracing` events; binaries decide how they
//! are rendered. Publish legs log with structured fields (`platform`,
//! `attempt`, `external_id`) so JSON output can be filtered per platform.
//!
//! ```no_run
//! use libcrosspost::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "libcrosspost=debug".to_string(), false)
//!     .init()
//!     .expect("logging already initialized");
//! ```

use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text without colors
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line colored output for development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `info` or `libcrosspost=debug`
    pub level: String,
    /// Forces `debug` unless `RUST_LOG` is set
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Read `CROSSPOST_LOG_FORMAT` and `CROSSPOST_LOG_LEVEL`, falling back to
    /// text output at `info`
    pub fn from_env() -> Self {
        let format = std::env::var("CROSSPOST_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let level = std::env::var("CROSSPOST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Self::new(format, level, false)
    }

    fn directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    /// Install the global subscriber, writing to stderr
    ///
    /// `RUST_LOG` takes precedence over the configured level. Fails if a
    /// subscriber is already installed.
    pub fn init(&self) -> Result<(), String> {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.directive()));

        let result = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init(),
        };

        result.map_err(|e| format!("Failed to initialize logging: {}", e))
    }
}

/// Initialize logging from the environment, ignoring a second initialization
pub fn init_default() {
    let _ = LoggingConfig::from_env().init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().unwrap_err().contains("'xml'"));
    }

    #[test]
    fn test_verbose_overrides_level() {
        let config = LoggingConfig::new(LogFormat::Text, "warn".to_string(), true);
        assert_eq!(config.directive(), "debug");

        let config = LoggingConfig::new(LogFormat::Text, "warn".to_string(), false);
        assert_eq!(config.directive(), "warn");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("CROSSPOST_LOG_FORMAT", "json");
        std::env::set_var("CROSSPOST_LOG_LEVEL", "trace");
        let config = LoggingConfig::from_env();
        std::env::remove_var("CROSSPOST_LOG_FORMAT");
        std::env::remove_var("CROSSPOST_LOG_LEVEL");

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "trace");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::remove_var("CROSSPOST_LOG_FORMAT");
        std::env::remove_var("CROSSPOST_LOG_LEVEL");
        let config = LoggingConfig::from_env();
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "info");
    }
}
