//! # Design
//!
//! - Centralize application-level errors for bootstrap.
//! - Keep error messages constant while carrying context fields for debugging.

use std::io;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        #[source]
        source: relay_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        #[source]
        source: relay_telemetry::TelemetryError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: relay_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: relay_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io { operation, source }
    }
}
