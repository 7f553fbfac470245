use relay_core::{EngineError, EngineResult};
use serde_json::{Map, Value};

use crate::client::{QbitClient, read_text};

impl QbitClient {
    /// `GET /app/version`.
    pub(crate) async fn version(&self) -> EngineResult<String> {
        let request = self.http().get(self.url("/app/version"));
        let response = self.execute("version", request).await?;
        read_text("version", response).await
    }

    /// `GET /app/preferences`.
    pub(crate) async fn preferences(&self) -> EngineResult<Map<String, Value>> {
        let request = self.http().get(self.url("/app/preferences"));
        let response = self.execute("app_preferences", request).await?;
        let body = read_text("app_preferences", response).await?;
        serde_json::from_str(&body).map_err(|source| EngineError::Decode {
            operation: "app_preferences",
            source,
        })
    }

    /// `POST /app/setPreferences`; preferences travel as a JSON form field.
    pub(crate) async fn apply_preferences(&self, preferences: &Map<String, Value>) -> EngineResult<()> {
        let json = Value::Object(preferences.clone()).to_string();
        let request = self
            .http()
            .post(self.url("/app/setPreferences"))
            .form(&[("json", json)]);
        self.execute("set_preferences", request).await.map(|_| ())
    }
}
