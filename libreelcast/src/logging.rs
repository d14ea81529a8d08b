//! Logging setup shared by the library and the `reel-post` binary
//!
//! Everything is written to stderr so that results printed on stdout stay
//! machine readable.
//!
//! # Examples
//!
//! ```no_run
//! use libreelcast::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//!
//! // or from REELCAST_LOG_FORMAT / REELCAST_LOG_LEVEL
//! libreelcast::logging::init_default();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain text without colors
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
        match s.trim().to_lowercase().as_str() {
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
    pub level: String,
    /// Forces `debug` unless `RUST_LOG` says otherwise
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

    /// Filter directive used when `RUST_LOG` is not set
    pub fn directive(&self) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.level.clone()
        }
    }

    /// Install the global subscriber
    ///
    /// Returns `false` if a subscriber was already installed, in which case
    /// this call changes nothing.
    pub fn init(&self) -> bool {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()));

        let installed = match self.format {
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
                .with_file(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false)
                .with_level(true)
                .try_init(),
        };

        installed.is_ok()
    }
}

/// Initialize logging from `REELCAST_LOG_FORMAT` and `REELCAST_LOG_LEVEL`
///
/// Falls back to text at `info` when unset or unparseable.
pub fn init_default() -> bool {
    LoggingConfig::from_env("info").init()
}

impl LoggingConfig {
    /// Read `REELCAST_LOG_FORMAT` and `REELCAST_LOG_LEVEL`, using
    /// `default_level` when the level is unset
    pub fn from_env(default_level: &str) -> Self {
        from_lookup(|key| std::env::var(key).ok(), default_level)
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

fn from_lookup(lookup: impl Fn(&str) -> Option<String>, default_level: &str) -> LoggingConfig {
    let format = lookup("REELCAST_LOG_FORMAT")
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let level = lookup("REELCAST_LOG_LEVEL").unwrap_or_else(|| default_level.to_string());
    LoggingConfig::new(format, level, false)
}
