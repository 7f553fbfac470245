//! Error types shared by the engine clients.
//!
//! # Design
//!
//! - Keep messages constant; carry operational context in fields.
//! - Classify failures once (`is_transient`, `is_not_found`) so callers match
//!   on variants instead of inspecting engine error text.

use relay_events::Gid;
use thiserror::Error;

/// Errors raised by download engine clients.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine does not know the requested download.
    #[error("download not found")]
    GidNotFound {
        /// Identifier the engine rejected, when known.
        gid: Option<Gid>,
    },
    /// The transport failed before a response arrived.
    #[error("engine transport failure")]
    Transport {
        /// Engine the request targeted.
        engine: &'static str,
        /// Transport level detail.
        message: String,
    },
    /// The engine did not answer in time.
    #[error("engine request timed out")]
    Timeout {
        /// Engine the request targeted.
        engine: &'static str,
        /// Operation that timed out.
        operation: &'static str,
    },
    /// The connection to the engine is closed or could not be opened.
    #[error("engine connection failure")]
    Connection {
        /// Engine the request targeted.
        engine: &'static str,
        /// Connection level detail.
        message: String,
    },
    /// The engine reported an internal failure that may clear on retry.
    #[error("engine runtime failure")]
    Runtime {
        /// Engine the request targeted.
        engine: &'static str,
        /// Failure detail.
        message: String,
    },
    /// The engine rejected a JSON-RPC request.
    #[error("engine rejected request")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Engine supplied message.
        message: String,
    },
    /// The REST engine answered with a non-success status.
    #[error("engine api error")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },
    /// A response could not be decoded into the expected shape.
    #[error("engine response could not be decoded")]
    Decode {
        /// Operation whose response failed to decode.
        operation: &'static str,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The request itself was invalid or refused.
    #[error("invalid engine request")]
    Validation {
        /// Field or parameter that was rejected.
        field: &'static str,
        /// Reason for the rejection.
        reason: String,
    },
    /// No handle exists for the engine (connection never established or closed).
    #[error("engine unavailable")]
    Unavailable {
        /// Engine name.
        engine: &'static str,
    },
}

impl EngineError {
    /// Whether the failure is worth retrying (network, timeout, connection, runtime).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Timeout { .. }
                | Self::Connection { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether the engine no longer knows the download.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::GidNotFound { .. })
    }
}

/// Convenience alias for engine client results.
pub type EngineResult<T> = Result<T, EngineError>;
