//! Error types for configuration loading.

use thiserror::Error;

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Primary error type for configuration loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Environment variable that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Only one half of a credential pair was supplied.
    #[error("incomplete credentials")]
    IncompleteCredentials {
        /// Variable that was set.
        present: &'static str,
        /// Variable that was missing.
        missing: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_do_not_leak_values() {
        let err = ConfigError::InvalidField {
            field: "QBIT_URL",
            value: Some("secret-ish".to_string()),
            reason: "unsupported scheme",
        };
        assert_eq!(err.to_string(), "invalid configuration field");
        let err = ConfigError::IncompleteCredentials {
            present: "QBIT_USERNAME",
            missing: "QBIT_PASSWORD",
        };
        assert_eq!(err.to_string(), "incomplete credentials");
    }
}
