//! Messages exchanged between [`crate::Aria2Client`] and its socket worker.

use relay_core::EngineResult;
use serde_json::Value;
use tokio::sync::oneshot;

/// Reply channel for one RPC call.
pub(crate) type Reply = oneshot::Sender<EngineResult<Value>>;

#[derive(Debug)]
pub(crate) enum RpcCommand {
    /// Send a request and route its response to `reply`.
    Call {
        /// Request id, unique for the connection.
        id: u64,
        /// Serialised JSON-RPC request.
        frame: String,
        reply: Reply,
    },
    /// Drop the pending entry for a call the client stopped waiting on.
    Forget { id: u64 },
    /// Close the socket and stop the worker.
    Close { done: oneshot::Sender<()> },
}
