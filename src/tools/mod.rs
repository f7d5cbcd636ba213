/// Tools Module
///
/// Tools compiled into the server. Each tool module exports a `register`
/// function that adds its descriptor to the registry and its handler to the
/// executor during startup.

pub mod echo;

use crate::core::config::ServerConfig;
use crate::core::executor::HandlerExecutor;
use crate::core::registry::ToolRegistry;

/// Build the tool catalog and the executor that backs it.
pub fn initialize_tools(config: &ServerConfig) -> (ToolRegistry, HandlerExecutor) {
    let mut registry = ToolRegistry::new();
    let mut executor = HandlerExecutor::new();

    // Add new tool registrations here:
    // your_tool::register(&mut registry, &mut executor);
    echo::register(&mut registry, &mut executor, &config.echo_prefix);

    (registry, executor)
}
