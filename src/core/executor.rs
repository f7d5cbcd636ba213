/// Operation Executor
///
/// The dispatcher never runs tool code itself; it hands the tool name and its
/// arguments to an [`OperationExecutor`] and waits for a JSON value or an
/// error. [`HandlerExecutor`] is the table-driven implementation used by the
/// binary: a map from tool name to an async handler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure reported by an executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Unknown tool: {0}")]
    UnknownOperation(String),

    /// The message is forwarded to the client as-is.
    #[error("{0}")]
    ExecutionFailure(String),
}

#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn invoke(&self, name: &str, args: Map<String, Value>) -> Result<Value, ExecutorError>;
}

/// Async tool handler.
///
/// Receives the call arguments and resolves to a JSON result or a
/// human-readable error message.
pub type ToolHandler =
    Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Executor dispatching by tool name through a handler table.
#[derive(Default)]
pub struct HandlerExecutor {
    handlers: HashMap<String, ToolHandler>,
}

impl HandlerExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: ToolHandler) {
        self.handlers.insert(name.into(), handler);
    }
}

#[async_trait]
impl OperationExecutor for HandlerExecutor {
    async fn invoke(&self, name: &str, args: Map<String, Value>) -> Result<Value, ExecutorError> {
        let handler = self
            .handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownOperation(name.to_string()))?;

        handler(args).await.map_err(ExecutorError::ExecutionFailure)
    }
}
