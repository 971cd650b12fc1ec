//! MCP Relay Server
//!
//! Reads JSON-RPC 2.0 frames from stdio, forwards each request to the remote
//! agent through a `Transport`, and writes the checked result back.
//!
//! Lifecycle: `Created -> Initializing -> Ready -> Closing -> Closed`. The
//! capability probe in `start()` must succeed before `serve()` will read a
//! single frame.

use std::fmt;
use std::future::Future;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, RequestIds, ResultShape, RpcCall, INVALID_REQUEST, PARSE_ERROR,
};
use crate::transport::Transport;

/// Where the server is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Initializing,
    Ready,
    Closing,
    Closed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Created => "created",
            ServerState::Initializing => "initializing",
            ServerState::Ready => "ready",
            ServerState::Closing => "closing",
            ServerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// MCP server that relays every request to the remote agent
pub struct RelayServer<T: Transport> {
    transport: T,
    ids: RequestIds,
    state: ServerState,
    /// Capabilities the remote declared during the startup probe
    capabilities: Option<Map<String, Value>>,
}

impl<T: Transport> RelayServer<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            ids: RequestIds::new(),
            state: ServerState::Created,
            capabilities: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn capabilities(&self) -> Option<&Map<String, Value>> {
        self.capabilities.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Probe the remote with `initialize` and become ready to serve.
    ///
    /// On failure the server drops back to `Created` and never attaches
    /// to the local channel.
    pub async fn start(&mut self) -> Result<(), RelayError> {
        if self.state != ServerState::Created {
            return Err(RelayError::NotReady(self.state));
        }

        self.state = ServerState::Initializing;

        let probe = serde_json::to_value(InitializeParams::probe())?;
        let result = match self.forward("initialize", probe).await {
            Ok(result) => result,
            Err(e) => {
                self.state = ServerState::Created;
                return Err(e);
            }
        };

        // Shape was already checked by forward()
        let init: InitializeResult = serde_json::from_value(result)?;
        let caps = serde_json::Value::Object(init.capabilities.clone());
        info!("Initializing with capabilities: {}", caps);
        info!(
            "Remote server: {} {} (protocol {})",
            init.server_info.name, init.server_info.version, init.protocol_version
        );

        self.capabilities = Some(init.capabilities);
        self.state = ServerState::Ready;
        Ok(())
    }

    /// Serve on process stdin/stdout until SIGINT/SIGTERM or EOF
    pub async fn run(&mut self) -> Result<(), RelayError> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();

        self.serve(stdin, stdout, shutdown_signal()).await
    }

    /// Serve line-delimited JSON-RPC frames until `shutdown` resolves or
    /// the reader reaches EOF, then close the writer.
    ///
    /// A read or write failure on the local channel ends the loop, but the
    /// writer is still closed before the error is returned.
    pub async fn serve<R, W, S>(
        &mut self,
        mut reader: R,
        mut writer: W,
        shutdown: S,
    ) -> Result<(), RelayError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        if self.state != ServerState::Ready {
            return Err(RelayError::NotReady(self.state));
        }

        info!("Relay ready, serving MCP over stdio");

        tokio::pin!(shutdown);
        let mut buf = Vec::new();

        let outcome: Result<(), RelayError> = loop {
            buf.clear();
            let read = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    info!("Client disconnected");
                    break Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to read from local channel: {}", e);
                    break Err(e.into());
                }
            }

            let resp = match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    debug!("Received: {}", line);
                    self.handle_message(line).await
                }
                Err(e) => {
                    error!("Frame is not valid UTF-8: {}", e);
                    Some(JsonRpcResponse::error(
                        None,
                        JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
                    ))
                }
            };

            if let Some(resp) = resp {
                if let Err(e) = write_response(&mut writer, &resp).await {
                    error!("Failed to write to local channel: {}", e);
                    break Err(e);
                }
            }
        };

        let closed = self.close(&mut writer).await;
        outcome.and(closed)
    }

    async fn close<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> Result<(), RelayError> {
        self.state = ServerState::Closing;

        if let Err(e) = writer.shutdown().await {
            error!("Failed to close local endpoint: {}", e);
            return Err(e.into());
        }

        self.state = ServerState::Closed;
        info!("Local endpoint closed");
        Ok(())
    }

    /// Handle a single JSON-RPC frame
    async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(message) {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                return Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
                ));
            }
        };

        // Replies from the client: we never issue requests, so nothing to match
        if value.get("method").is_none()
            && (value.get("result").is_some() || value.get("error").is_some())
        {
            debug!("Ignoring response frame from client");
            return None;
        }

        let id = value.get("id").cloned();
        let request = match JsonRpcRequest::deserialize(&value) {
            Ok(req) if req.jsonrpc == "2.0" => req,
            Ok(req) => {
                warn!("Unsupported jsonrpc version: {}", req.jsonrpc);
                return Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::new(INVALID_REQUEST, "Invalid Request: jsonrpc must be \"2.0\""),
                ));
            }
            Err(e) => {
                warn!("Invalid request: {}", e);
                return Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::new(INVALID_REQUEST, format!("Invalid Request: {}", e)),
                ));
            }
        };

        if request.is_notification() {
            self.handle_notification(&request.method);
            return None;
        }

        match self.handle_request(&request.method, request.params).await {
            Ok(result) => Some(JsonRpcResponse::success(request.id, result)),
            Err(e) => {
                warn!("{} failed: {}", request.method, e);
                Some(JsonRpcResponse::error(request.id, e.to_rpc_error()))
            }
        }
    }

    /// Notifications are local bookkeeping only and never reach the remote
    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" => info!("Client initialized"),
            "notifications/cancelled" => debug!("Request cancelled"),
            _ => debug!("Unknown notification: {}", method),
        }
    }

    /// Dispatch a request to its handler
    async fn handle_request(&self, method: &str, params: Option<Value>) -> Result<Value, RelayError> {
        match method {
            "initialize" => self.handle_initialize(params).await,
            "tools/list" => self.handle_list_tools(params).await,
            "tools/call" => self.handle_call_tool(params).await,
            _ => self.handle_fallback(method, params).await,
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value, RelayError> {
        let params = match params {
            Some(p) if InitializeParams::deserialize(&p).is_ok() => p,
            _ => serde_json::to_value(InitializeParams::probe())?,
        };

        self.forward("initialize", params).await
    }

    async fn handle_list_tools(&self, params: Option<Value>) -> Result<Value, RelayError> {
        self.forward("tools/list", params.unwrap_or_else(|| json!({})))
            .await
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, RelayError> {
        let params = params.ok_or_else(|| RelayError::InvalidParams("Missing params".to_string()))?;
        let call = CallToolParams::deserialize(&params)
            .map_err(|e| RelayError::InvalidParams(e.to_string()))?;

        info!("Calling tool: {}", call.name);
        let result = self.forward("tools/call", params).await?;
        debug!("CallToolResult: {}", result);

        Ok(result)
    }

    async fn handle_fallback(&self, method: &str, params: Option<Value>) -> Result<Value, RelayError> {
        debug!("Forwarding {} through fallback", method);
        self.forward(method, params.unwrap_or_else(|| json!({})))
            .await
    }

    /// One outbound round trip with a fresh id, checked against the result
    /// shape expected for `method`
    async fn forward(&self, method: &str, params: Value) -> Result<Value, RelayError> {
        let call = RpcCall::new(self.ids.next_id(), method, params);
        let envelope = self.transport.send(call).await?;

        ResultShape::for_method(method)
            .validate(&envelope.result)
            .map_err(|reason| RelayError::InvalidUpstreamResponse {
                method: method.to_string(),
                reason,
            })?;

        Ok(envelope.result)
    }
}

/// Write one reply frame followed by a newline
async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    resp: &JsonRpcResponse,
) -> Result<(), RelayError> {
    let resp_str = serde_json::to_string(resp)?;
    debug!("Sending: {}", resp_str);
    writer.write_all(resp_str.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => {
                error!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
