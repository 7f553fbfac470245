//! Typed configuration consumed by the connector and the listener.

use std::time::Duration;

use relay_telemetry::LogFormat;
use url::Url;

/// Connection settings for the aria2 websocket RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aria2Settings {
    /// `ws://` JSON-RPC endpoint.
    pub rpc_url: Url,
    /// RPC secret sent as `token:<secret>`.
    pub secret: Option<String>,
    /// Upper bound on a single RPC round trip.
    pub request_timeout: Duration,
}

/// Connection settings for the qBittorrent Web API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QbitSettings {
    /// Base URL of the Web UI.
    pub base_url: Url,
    /// Login user, paired with `password`.
    pub username: Option<String>,
    /// Login password, paired with `username`.
    pub password: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl QbitSettings {
    /// Credentials when both halves are configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .zip(self.password.as_deref())
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Engine A settings.
    pub aria2: Aria2Settings,
    /// Engine B settings.
    pub qbit: QbitSettings,
    /// Root directory downloads land in.
    pub download_dir: String,
    /// Public index URL; enables file-selection prompts when set.
    pub base_url: Option<Url>,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}
