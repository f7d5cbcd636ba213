/// Core Server Framework Module
///
/// - protocol.rs: JSON-RPC 2.0 message types and the MCP method table
/// - registry.rs: Tool descriptors advertised through `tools/list`
/// - executor.rs: Operation executor contract and the handler-table executor
/// - dispatcher.rs: Request processing and response routing
/// - session.rs: SSE session table, frames and keep-alive
/// - server.rs: HTTP + SSE and STDIO transports
/// - config.rs: Environment-driven configuration
/// - error.rs: Transport-level errors

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
