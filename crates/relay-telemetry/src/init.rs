//! Subscriber installation and logging configuration.
//!
//! # Design
//! - Single entry point for fmt or JSON output.
//! - Build SHA is recorded once and stamped on the process span.

use once_cell::sync::OnceCell;
use tracing::{Span, span::Entered};
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{Result, TelemetryError};

/// Default logging target when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Configure and install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`.
///
/// # Errors
///
/// Returns an error if another subscriber has already been installed.
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    // A second initialisation keeps the first SHA.
    let _ = BUILD_SHA.set(config.build_sha.to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level));
    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    }
    .map_err(|source| TelemetryError::SubscriberInstall { source })
}

/// Access the build SHA recorded during logging initialisation.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or("dev", String::as_str)
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Log level string (e.g., `info`, `debug`).
    pub level: &'a str,
    /// Output format selection for the tracing subscriber.
    pub format: LogFormat,
    /// Build identifier recorded in structured logs.
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Emit logs as structured JSON objects.
    Json,
    /// Emit human-readable, pretty-printed logs.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Parse a configured format name, falling back to [`LogFormat::infer`].
    #[must_use]
    pub fn from_name(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(name) if name.eq_ignore_ascii_case("json") => Self::Json,
            Some(name) if name.eq_ignore_ascii_case("pretty") => Self::Pretty,
            _ => Self::infer(),
        }
    }
}

/// Guard that keeps the application-level span entered for the lifetime of the process.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the process span tagged with `mode`.
    #[must_use]
    pub fn new(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        let span: &'static Span = Box::leak(Box::new(
            tracing::info_span!("relay", mode = %mode, build_sha = %build_sha()),
        ));
        Self {
            _guard: span.enter(),
        }
    }
}
