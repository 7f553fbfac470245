//! JSON-RPC 2.0 framing for aria2.

use relay_core::{EngineError, Gid};
use relay_events::DownloadEvent;
use serde::Deserialize;
use serde_json::{Value, json};

/// Text aria2 puts in every error about an unknown GID.
const NOT_FOUND_TEXT: &str = "is not found";

/// Build a request frame, prefixing the secret token when one is configured.
pub(crate) fn request(id: u64, method: &str, secret: Option<&str>, params: Vec<Value>) -> String {
    let mut all = Vec::with_capacity(params.len() + 1);
    if let Some(secret) = secret {
        all.push(Value::String(format!("token:{secret}")));
    }
    all.extend(params);
    json!({
        "jsonrpc": "2.0",
        "id": id.to_string(),
        "method": method,
        "params": all,
    })
    .to_string()
}

/// One decoded inbound frame.
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
    /// Answer to the request with `id`.
    Response {
        id: u64,
        outcome: Result<Value, RpcFailure>,
    },
    /// Push notifications, one per GID in the params.
    Notifications(Vec<DownloadEvent>),
    /// Push notification for a method the pipeline does not consume.
    Ignored { method: String },
}

/// Error object of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct RpcFailure {
    pub(crate) code: i64,
    pub(crate) message: String,
}

impl RpcFailure {
    /// Translate into the typed engine error; `gid` is the download the call
    /// targeted, if any.
    pub(crate) fn into_error(self, gid: Option<Gid>) -> EngineError {
        if self.message.contains(NOT_FOUND_TEXT) {
            EngineError::GidNotFound { gid }
        } else {
            EngineError::Rpc {
                code: self.code,
                message: self.message,
            }
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Vec<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFailure>,
}

#[derive(Deserialize)]
struct GidParam {
    gid: Gid,
}

/// Decode one text frame.
///
/// # Errors
///
/// Returns a decode error for frames that are neither responses nor
/// notifications.
pub(crate) fn decode(text: &str) -> Result<Frame, EngineError> {
    let raw: RawFrame = serde_json::from_str(text).map_err(|source| EngineError::Decode {
        operation: "frame",
        source,
    })?;

    if let Some(id) = raw.id.as_ref().and_then(parse_id) {
        let outcome = match raw.error {
            Some(failure) => Err(failure),
            None => Ok(raw.result.unwrap_or(Value::Null)),
        };
        return Ok(Frame::Response { id, outcome });
    }

    let Some(method) = raw.method else {
        return Err(EngineError::Validation {
            field: "frame",
            reason: "neither a response nor a notification".to_string(),
        });
    };

    let mut events = Vec::with_capacity(raw.params.len());
    for param in raw.params {
        let GidParam { gid } =
            serde_json::from_value(param).map_err(|source| EngineError::Decode {
                operation: "notification",
                source,
            })?;
        match DownloadEvent::from_notification(&method, gid) {
            Some(event) => events.push(event),
            None => return Ok(Frame::Ignored { method }),
        }
    }
    Ok(Frame::Notifications(events))
}

fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::String(text) => text.parse().ok(),
        Value::Number(number) => number.as_u64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_token_first() {
        let frame = request(7, "aria2.tellStatus", Some("s3"), vec![json!("2089b05e")]);
        let value: Value = serde_json::from_str(&frame).expect("valid json");
        assert_eq!(value["id"], "7");
        assert_eq!(value["params"], json!(["token:s3", "2089b05e"]));

        let frame = request(8, "aria2.forcePauseAll", None, Vec::new());
        let value: Value = serde_json::from_str(&frame).expect("valid json");
        assert_eq!(value["params"], json!([]));
    }

    #[test]
    fn responses_resolve_by_id() {
        let frame = decode(r#"{"jsonrpc":"2.0","id":"3","result":"OK"}"#).expect("decodes");
        assert_eq!(
            frame,
            Frame::Response {
                id: 3,
                outcome: Ok(json!("OK"))
            }
        );
    }

    #[test]
    fn unknown_gid_errors_become_typed() {
        let frame = decode(
            r#"{"jsonrpc":"2.0","id":"4","error":{"code":1,"message":"GID 2089b05ecca3d829 is not found"}}"#,
        )
        .expect("decodes");
        let Frame::Response {
            outcome: Err(failure),
            ..
        } = frame
        else {
            panic!("expected failed response");
        };
        let err = failure.into_error(Some(Gid::from("2089b05ecca3d829")));
        assert!(err.is_not_found());

        let other = RpcFailure {
            code: 1,
            message: "Unauthorized".to_string(),
        }
        .into_error(None);
        assert!(matches!(other, EngineError::Rpc { code: 1, .. }));
    }

    #[test]
    fn notifications_fan_out_per_gid() {
        let frame = decode(
            r#"{"jsonrpc":"2.0","method":"aria2.onBtDownloadComplete","params":[{"gid":"a1"},{"gid":"b2"}]}"#,
        )
        .expect("decodes");
        assert_eq!(
            frame,
            Frame::Notifications(vec![
                DownloadEvent::BtCompleted { gid: Gid::from("a1") },
                DownloadEvent::BtCompleted { gid: Gid::from("b2") },
            ])
        );
    }

    #[test]
    fn unconsumed_methods_are_ignored() {
        let frame = decode(
            r#"{"jsonrpc":"2.0","method":"aria2.onDownloadPause","params":[{"gid":"a1"}]}"#,
        )
        .expect("decodes");
        assert_eq!(
            frame,
            Frame::Ignored {
                method: "aria2.onDownloadPause".to_string()
            }
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"jsonrpc":"2.0"}"#).is_err());
    }
}
