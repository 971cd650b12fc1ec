//! Outbound transport
//!
//! POSTs JSON-RPC envelopes to the Gentoro agent endpoint and decodes the
//! reply into a success envelope or a `RelayError`.
//!
//! Each call is a single attempt. There is no retry and no timeout beyond
//! the HTTP client defaults.

use std::future::Future;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::protocol::{RpcCall, SuccessEnvelope, INTERNAL_ERROR};

/// Sends one outbound call and waits for its reply
pub trait Transport: Send + Sync {
    fn send(
        &self,
        call: RpcCall,
    ) -> impl Future<Output = Result<SuccessEnvelope, RelayError>> + Send;
}

/// Decoded shape of a remote reply body
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamReply {
    Success(SuccessEnvelope),
    ProtocolError {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    Malformed(String),
}

impl UpstreamReply {
    pub fn into_result(self) -> Result<SuccessEnvelope, RelayError> {
        match self {
            UpstreamReply::Success(envelope) => Ok(envelope),
            UpstreamReply::ProtocolError {
                code,
                message,
                data,
            } => Err(RelayError::Remote {
                code,
                message,
                data,
            }),
            UpstreamReply::Malformed(reason) => Err(RelayError::MalformedUpstream(reason)),
        }
    }
}

/// Classify a reply body as success, error, or neither
pub fn classify(body: &Value) -> UpstreamReply {
    let Some(obj) = body.as_object() else {
        return UpstreamReply::Malformed("response body is not a JSON object".to_string());
    };

    if obj.get("result").is_some_and(Value::is_object) && !obj.contains_key("error") {
        if let Ok(envelope) = serde_json::from_value::<SuccessEnvelope>(body.clone()) {
            return UpstreamReply::Success(envelope);
        }
    }

    if let Some(error) = obj.get("error").and_then(Value::as_object) {
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            let code = error
                .get("code")
                .and_then(Value::as_i64)
                .filter(|c| *c != 0)
                .unwrap_or(INTERNAL_ERROR);

            return UpstreamReply::ProtocolError {
                code,
                message: message.to_string(),
                data: error.get("data").cloned(),
            };
        }
    }

    UpstreamReply::Malformed(
        "response is neither a success nor an error envelope".to_string(),
    )
}

/// Pick the most useful message out of a non-2xx reply
fn status_error_message(status: StatusCode, body: &[u8]) -> String {
    let reported = serde_json::from_slice::<Value>(body).ok().and_then(|v| {
        v.get("message")
            .and_then(Value::as_str)
            .or_else(|| v.pointer("/error/message").and_then(Value::as_str))
            .map(str::to_string)
    });

    reported.unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()))
}

/// HTTP transport bound to one agent endpoint
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    /// Pre-computed `{agent base}/mcp` URL
    mcp_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Create a transport for the agent named in `config`.
    ///
    /// Fails if the base URL or bridge identifier is missing, or if the URL
    /// cannot be parsed.
    pub fn new(config: &Config) -> Result<Self, RelayError> {
        let mcp_url = format!("{}/mcp", config.endpoint()?);

        reqwest::Url::parse(&mcp_url)
            .map_err(|e| RelayError::Client(format!("invalid URL '{}': {}", mcp_url, e)))?;

        let client = Client::builder()
            .build()
            .map_err(|e| RelayError::Client(e.to_string()))?;

        Ok(Self {
            client,
            mcp_url,
            api_key: config.api_key.clone(),
        })
    }

    pub fn mcp_url(&self) -> &str {
        &self.mcp_url
    }
}

impl Transport for HttpTransport {
    async fn send(&self, call: RpcCall) -> Result<SuccessEnvelope, RelayError> {
        debug!("POST {} method={} id={}", self.mcp_url, call.method, call.id);

        let mut request = self.client.post(&self.mcp_url).json(&call);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!("Remote returned {} for {}", status, call.method);
            return Err(RelayError::Transport(status_error_message(status, &body)));
        }

        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| RelayError::Transport(format!("invalid JSON in response: {}", e)))?;

        classify(&value).into_result()
    }
}
