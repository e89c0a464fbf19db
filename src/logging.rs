//! Logging setup for the `offcache` binary
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application. [`init_logging`] is the one the CLI uses: a `fmt`
//! layer on stderr, filtered by `RUST_LOG` when set and by
//! [`LoggingConfig::directive`] otherwise.

use std::io;

use thiserror::Error;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter applied when `RUST_LOG` is not set
pub const DEFAULT_DIRECTIVE: &str = "offcache=info";

/// Filter applied for `--verbose` when `RUST_LOG` is not set
pub const VERBOSE_DIRECTIVE: &str = "offcache=debug";

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive could not be parsed
    #[error("Invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },

    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    AlreadyInitialized(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// One line per event
    #[default]
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset (e.g. "offcache=debug")
    pub directive: String,
    /// Display target module in logs
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            directive: DEFAULT_DIRECTIVE.to_string(),
            display_target: false,
        }
    }
}

impl LoggingConfig {
    /// Config for `--verbose`: debug events, with targets
    pub fn verbose() -> Self {
        Self {
            directive: VERBOSE_DIRECTIVE.to_string(),
            display_target: true,
            ..Self::default()
        }
    }

    /// Set log format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the fallback filter directive
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }
}

/// Installs the global subscriber
///
/// # Errors
/// Fails if the directive does not parse, or if a subscriber is already
/// installed (callers that may initialize twice can ignore the latter).
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_writer(io::stderr);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt_layer.pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt_layer.compact()).try_init(),
    };

    installed.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.directive).map_err(|e| LoggingError::InvalidFilter {
        directive: config.directive.clone(),
        message: e.to_string(),
    })
}
