use relay_core::{EngineError, EngineResult, TransferInfo};

use crate::client::{QbitClient, read_text};

impl QbitClient {
    /// `GET /transfer/info`.
    pub(crate) async fn transfer(&self) -> EngineResult<TransferInfo> {
        let request = self.http().get(self.url("/transfer/info"));
        let response = self.execute("transfer_info", request).await?;
        let body = read_text("transfer_info", response).await?;
        serde_json::from_str(&body).map_err(|source| EngineError::Decode {
            operation: "transfer_info",
            source,
        })
    }
}
