use relay_core::{EngineError, EngineResult};

use crate::client::QbitClient;

fn require_hashes(hashes: &str) -> EngineResult<&str> {
    let trimmed = hashes.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation {
            field: "hashes",
            reason: "at least one hash or `all` is required".to_string(),
        });
    }
    Ok(trimmed)
}

impl QbitClient {
    /// `POST /torrents/stop`.
    pub(crate) async fn stop(&self, hashes: &str) -> EngineResult<()> {
        let hashes = require_hashes(hashes)?;
        let request = self
            .http()
            .post(self.url("/torrents/stop"))
            .form(&[("hashes", hashes)]);
        self.execute("torrents_stop", request).await.map(|_| ())
    }

    /// `POST /torrents/delete`.
    pub(crate) async fn delete(&self, hashes: &str, delete_files: bool) -> EngineResult<()> {
        let hashes = require_hashes(hashes)?;
        let delete_files = if delete_files { "true" } else { "false" };
        let request = self
            .http()
            .post(self.url("/torrents/delete"))
            .form(&[("hashes", hashes), ("deleteFiles", delete_files)]);
        self.execute("torrents_delete", request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hash_lists_are_rejected() {
        assert!(require_hashes("  ").is_err());
        assert_eq!(require_hashes(" all ").ok(), Some("all"));
    }
}
