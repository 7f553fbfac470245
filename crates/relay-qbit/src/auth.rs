use relay_core::{EngineError, EngineResult};
use tracing::debug;

use crate::client::{ENGINE, QbitClient, read_text};

impl QbitClient {
    /// `POST /auth/login`.
    pub(crate) async fn login(&self, username: &str, password: &str) -> EngineResult<()> {
        let request = self
            .http()
            .post(self.url("/auth/login"))
            .form(&[("username", username), ("password", password)]);
        let response = self.execute("login", request).await?;
        let body = read_text("login", response).await?;
        if body.trim() == "Ok." {
            debug!("logged in to qbittorrent");
            Ok(())
        } else {
            Err(EngineError::Validation {
                field: "credentials",
                reason: format!("{ENGINE} rejected login"),
            })
        }
    }

    /// `POST /auth/logout`.
    pub(crate) async fn logout(&self) -> EngineResult<()> {
        let request = self.http().post(self.url("/auth/logout"));
        self.execute("logout", request).await.map(|_| ())
    }
}
