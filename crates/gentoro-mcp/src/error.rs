//! Relay errors
//!
//! Every failure the relay can hit maps onto a JSON-RPC error object that is
//! returned to the local caller.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::{JsonRpcError, INTERNAL_ERROR, INVALID_PARAMS};
use crate::server::ServerState;

/// Relay-specific errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Missing configuration: {0} is not set")]
    MissingConfig(&'static str),

    /// Well-formed error envelope reported by the remote
    #[error("{message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Gentoro API error: {0}")]
    Transport(String),

    #[error("Malformed upstream response: {0}")]
    MalformedUpstream(String),

    #[error("Invalid upstream response for {method}: {reason}")]
    InvalidUpstreamResponse { method: String, reason: String },

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Server is not ready (state: {0})")]
    NotReady(ServerState),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// JSON-RPC error code reported to the local caller
    pub fn code(&self) -> i64 {
        match self {
            RelayError::Remote { code, .. } => *code,
            RelayError::InvalidParams(_) => INVALID_PARAMS,
            _ => INTERNAL_ERROR,
        }
    }

    /// Convert into the error object of a local reply
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let data = match self {
            RelayError::Remote { data, .. } => data.clone(),
            _ => None,
        };

        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_error_is_preserved() {
        let err = RelayError::Remote {
            code: -32000,
            message: "boom".to_string(),
            data: Some(json!({"detail": 1})),
        };
        let rpc = err.to_rpc_error();

        assert_eq!(rpc.code, -32000);
        assert_eq!(rpc.message, "boom");
        assert_eq!(rpc.data, Some(json!({"detail": 1})));
    }

    #[test]
    fn test_transport_error_uses_internal_code() {
        let err = RelayError::Transport("connection refused".to_string());
        let rpc = err.to_rpc_error();

        assert_eq!(rpc.code, INTERNAL_ERROR);
        assert_eq!(rpc.message, "Gentoro API error: connection refused");
        assert!(rpc.data.is_none());
    }

    #[test]
    fn test_codes() {
        assert_eq!(RelayError::InvalidParams("x".into()).code(), INVALID_PARAMS);
        assert_eq!(RelayError::MalformedUpstream("x".into()).code(), INTERNAL_ERROR);
        assert_eq!(
            RelayError::InvalidUpstreamResponse {
                method: "tools/list".into(),
                reason: "missing field `tools`".into(),
            }
            .code(),
            INTERNAL_ERROR
        );
    }
}
