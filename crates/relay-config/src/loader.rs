//! Environment lookup with defaults.

use std::time::Duration;

use relay_telemetry::{DEFAULT_LOG_LEVEL, LogFormat};
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::model::{Aria2Settings, BotConfig, QbitSettings};
use crate::validate::{non_empty, parse_url};

/// Default aria2 websocket endpoint.
pub const DEFAULT_ARIA2_RPC_URL: &str = "ws://127.0.0.1:6800/jsonrpc";
/// Default qBittorrent Web UI.
pub const DEFAULT_QBIT_URL: &str = "http://127.0.0.1:8090";
/// Default download root.
pub const DEFAULT_DOWNLOAD_DIR: &str = "/usr/src/app/downloads";
/// Upper bound on a single engine request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl BotConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps variable names to values.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable holds an invalid value or only one
    /// half of the qBittorrent credentials is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| non_empty(lookup(key));

        let rpc_url = get("ARIA2_RPC_URL").unwrap_or_else(|| DEFAULT_ARIA2_RPC_URL.to_string());
        let aria2 = Aria2Settings {
            rpc_url: parse_url("ARIA2_RPC_URL", &rpc_url, &["ws"])?,
            secret: get("ARIA2_SECRET"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };

        let qbit_url = get("QBIT_URL").unwrap_or_else(|| DEFAULT_QBIT_URL.to_string());
        let username = get("QBIT_USERNAME");
        let password = get("QBIT_PASSWORD");
        match (&username, &password) {
            (Some(_), None) => {
                return Err(ConfigError::IncompleteCredentials {
                    present: "QBIT_USERNAME",
                    missing: "QBIT_PASSWORD",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompleteCredentials {
                    present: "QBIT_PASSWORD",
                    missing: "QBIT_USERNAME",
                });
            }
            _ => {}
        }
        let qbit = QbitSettings {
            base_url: parse_url("QBIT_URL", &qbit_url, &["http", "https"])?,
            username,
            password,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };

        let base_url = get("BASE_URL")
            .map(|value| parse_url("BASE_URL", value.trim_end_matches('/'), &["http", "https"]))
            .transpose()?;

        let config = Self {
            aria2,
            qbit,
            download_dir: get("DOWNLOAD_DIR").unwrap_or_else(|| DEFAULT_DOWNLOAD_DIR.to_string()),
            base_url,
            log_level: get("RELAY_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: LogFormat::from_name(get("RELAY_LOG_FORMAT").as_deref()),
        };
        debug!(
            aria2 = %config.aria2.rpc_url,
            qbit = %config.qbit.base_url,
            selection_prompts = config.base_url.is_some(),
            "configuration loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() -> Result<()> {
        let config = BotConfig::from_lookup(lookup(&[]))?;
        assert_eq!(config.aria2.rpc_url.as_str(), DEFAULT_ARIA2_RPC_URL);
        assert_eq!(config.qbit.base_url.as_str(), "http://127.0.0.1:8090/");
        assert_eq!(config.download_dir, DEFAULT_DOWNLOAD_DIR);
        assert_eq!(config.log_level, "info");
        assert!(config.base_url.is_none());
        assert!(config.qbit.credentials().is_none());
        Ok(())
    }

    #[test]
    fn explicit_values_override_defaults() -> Result<()> {
        let config = BotConfig::from_lookup(lookup(&[
            ("ARIA2_RPC_URL", "ws://aria.internal:6800/jsonrpc"),
            ("ARIA2_SECRET", "s3cret"),
            ("QBIT_USERNAME", "admin"),
            ("QBIT_PASSWORD", "hunter2"),
            ("BASE_URL", "https://index.example.org/"),
            ("RELAY_LOG_FORMAT", "json"),
        ]))?;
        assert_eq!(config.aria2.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.qbit.credentials(), Some(("admin", "hunter2")));
        assert_eq!(
            config.base_url.as_ref().map(url::Url::as_str),
            Some("https://index.example.org/")
        );
        assert_eq!(config.log_format, LogFormat::Json);
        Ok(())
    }

    #[test]
    fn half_credentials_are_rejected() {
        let err = BotConfig::from_lookup(lookup(&[("QBIT_USERNAME", "admin")]))
            .expect_err("password missing");
        assert_eq!(
            err,
            ConfigError::IncompleteCredentials {
                present: "QBIT_USERNAME",
                missing: "QBIT_PASSWORD",
            }
        );
    }

    #[test]
    fn invalid_urls_name_the_field() {
        let err = BotConfig::from_lookup(lookup(&[("QBIT_URL", "ftp://host")]))
            .expect_err("ftp rejected");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "QBIT_URL",
                ..
            }
        ));
    }
}
