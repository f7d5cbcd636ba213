/// JSON-RPC Dispatcher
///
/// Turns one JSON-RPC request into at most one JSON-RPC response. Method
/// resolution goes through [`Method`]; tool invocations are delegated to the
/// configured [`OperationExecutor`]. Notifications (requests without an id)
/// never produce a response, not even when processing fails.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::core::error::TransportError;
use crate::core::executor::{ExecutorError, OperationExecutor};
use crate::core::protocol::{INTERNAL_ERROR, MCPRequest, MCPResponse, Method, PROTOCOL_VERSION};
use crate::core::registry::ToolRegistry;
use crate::core::session::{SessionManager, SseFrame};

/// Server identity reported by `initialize`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Failure while processing a parsed request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Method not found: {0}")]
    UnknownMethod(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

pub struct Dispatcher {
    info: ServerInfo,
    registry: Arc<ToolRegistry>,
    executor: Arc<dyn OperationExecutor>,
    sessions: Arc<SessionManager>,
}

impl Dispatcher {
    pub fn new(
        info: ServerInfo,
        registry: Arc<ToolRegistry>,
        executor: Arc<dyn OperationExecutor>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            info,
            registry,
            executor,
            sessions,
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Parse a submission body as a single JSON-RPC request object.
    pub fn parse(body: &[u8]) -> Result<MCPRequest, TransportError> {
        serde_json::from_slice(body).map_err(|e| TransportError::InvalidBody(e.to_string()))
    }

    /// Accept one submission for `token`.
    ///
    /// The body is parsed before this returns, so a malformed body is
    /// reported to the caller right away. Processing and routing run on a
    /// spawned task; the caller may await the handle to observe the response
    /// or drop it and rely on the SSE stream.
    ///
    /// # Arguments
    /// * `token` - Session the response is routed to
    /// * `body` - Raw submission body
    pub fn handle(
        self: &Arc<Self>,
        token: String,
        body: &[u8],
    ) -> Result<JoinHandle<Option<MCPResponse>>, TransportError> {
        let request = Self::parse(body)?;
        let dispatcher = Arc::clone(self);
        Ok(tokio::spawn(async move {
            dispatcher.deliver(&token, request).await
        }))
    }

    /// Process `request` and write any response to the session's stream.
    ///
    /// A session that disappeared while the request was in flight is not an
    /// error; the response is dropped.
    pub async fn deliver(&self, token: &str, request: MCPRequest) -> Option<MCPResponse> {
        let response = self.dispatch(request).await?;

        let frame = match SseFrame::message(&response) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(session = %token, error = %e, "failed to serialize response");
                return Some(response);
            }
        };

        let delivered = self
            .sessions
            .get(token)
            .is_some_and(|session| session.send(frame));
        if !delivered {
            tracing::debug!(session = %token, "session gone, dropping response");
        }
        Some(response)
    }

    /// Process one request independent of any transport.
    pub async fn dispatch(&self, request: MCPRequest) -> Option<MCPResponse> {
        let MCPRequest {
            id, method, params, ..
        } = request;

        let outcome = self.call(Method::from_name(&method), params).await;

        // notifications are never answered
        let id = id?;
        match outcome {
            Ok(Some(result)) => Some(MCPResponse::success(id, result)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(method = %method, error = %e, "request failed");
                Some(MCPResponse::failure(id, INTERNAL_ERROR, e.to_string()))
            }
        }
    }

    async fn call(
        &self,
        method: Method,
        params: Option<Value>,
    ) -> Result<Option<Value>, DispatchError> {
        match method {
            Method::Initialize => Ok(Some(self.initialize_result())),
            Method::Initialized => Ok(None),
            Method::ListTools => Ok(Some(json!({
                "tools": self.registry.list_descriptors()
            }))),
            Method::CallTool => self.call_tool(params).await.map(Some),
            Method::Ping => Ok(Some(json!({}))),
            Method::Unknown(name) => Err(DispatchError::UnknownMethod(name)),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version
            }
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, DispatchError> {
        let (name, arguments) = tool_call_params(params)?;

        tracing::debug!(tool = %name, "invoking tool");
        let result = self.executor.invoke(&name, arguments).await?;

        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| ExecutorError::ExecutionFailure(e.to_string()))?;

        Ok(json!({
            "content": [
                {
                    "type": "text",
                    "text": text
                }
            ]
        }))
    }
}

/// Extract the tool name and argument object from `tools/call` params.
fn tool_call_params(params: Option<Value>) -> Result<(String, Map<String, Value>), DispatchError> {
    let mut params = match params {
        Some(Value::Object(map)) => map,
        _ => return Err(DispatchError::InvalidParams("expected an object".into())),
    };

    let name = match params.remove("name") {
        Some(Value::String(name)) => name,
        _ => return Err(DispatchError::InvalidParams("missing tool name".into())),
    };

    let arguments = match params.remove("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(DispatchError::InvalidParams(
                "arguments must be an object".into(),
            ));
        }
    };

    Ok((name, arguments))
}
