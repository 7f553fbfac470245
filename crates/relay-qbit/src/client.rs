#![allow(clippy::redundant_pub_crate)]

use std::sync::Arc;

use relay_config::QbitSettings;
use relay_core::{EngineError, EngineResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::info;

/// Engine label used in errors, logs and metrics.
pub const ENGINE: &str = "qbittorrent";

/// Cookie-authenticated qBittorrent Web API client.
#[derive(Clone)]
pub struct QbitClient {
    client: Client,
    base_url: Arc<str>,
}

impl QbitClient {
    /// Build the HTTP client, log in when credentials are configured and
    /// probe the API version.
    ///
    /// # Errors
    ///
    /// Returns an error when the client cannot be built, login is refused or
    /// the version probe fails.
    pub async fn connect(settings: &QbitSettings) -> EngineResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| EngineError::Runtime {
                engine: ENGINE,
                message: err.to_string(),
            })?;
        let this = Self::with_client(client, settings.base_url.as_str());

        if let Some((username, password)) = settings.credentials() {
            this.login(username, password).await?;
        }
        let version = this.version().await?;
        info!(url = %settings.base_url, version = %version, "connected to qbittorrent");
        Ok(this)
    }

    /// Wrap an existing client; it must have the cookie store enabled.
    #[must_use]
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    pub(crate) const fn http(&self) -> &Client {
        &self.client
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/api/v2{path}", self.base_url)
    }

    /// Send `request`, returning the response when the status is a success.
    pub(crate) async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> EngineResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|err| transport_error(operation, &err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(status_error(status, message))
    }

}

/// Read a successful response body.
pub(crate) async fn read_text(operation: &'static str, response: Response) -> EngineResult<String> {
    response
        .text()
        .await
        .map_err(|err| transport_error(operation, &err))
}

pub(crate) fn transport_error(operation: &'static str, err: &reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout {
            engine: ENGINE,
            operation,
        }
    } else if err.is_connect() {
        EngineError::Connection {
            engine: ENGINE,
            message: err.to_string(),
        }
    } else {
        EngineError::Transport {
            engine: ENGINE,
            message: err.to_string(),
        }
    }
}

pub(crate) fn status_error(status: StatusCode, message: String) -> EngineError {
    if status == StatusCode::FORBIDDEN {
        EngineError::Validation {
            field: "session",
            reason: "forbidden; login required or banned".to_string(),
        }
    } else {
        EngineError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rooted_at_api_v2() {
        let client = QbitClient::with_client(Client::new(), "http://127.0.0.1:8090/");
        assert_eq!(
            client.url("/transfer/info"),
            "http://127.0.0.1:8090/api/v2/transfer/info"
        );
    }

    #[test]
    fn forbidden_maps_to_validation() {
        let err = status_error(StatusCode::FORBIDDEN, "Forbidden".to_string());
        assert!(matches!(err, EngineError::Validation { field: "session", .. }));
        assert!(!err.is_transient());

        let err = status_error(StatusCode::CONFLICT, "busy".to_string());
        assert!(matches!(err, EngineError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn refused_connections_are_transient() {
        let client = QbitClient::with_client(Client::new(), "http://127.0.0.1:9");
        let request = client.http().get(client.url("/app/version"));
        let err = client
            .execute("version", request)
            .await
            .expect_err("nothing listens on the discard port");
        assert!(err.is_transient());
    }
}
