/// Echo Tool
///
/// Returns the message it was given, optionally re-cased and prefixed with the
/// configured `ECHO_PREFIX`. Handy for checking a client's wiring end to end.

use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::{Map, Value, json};

use crate::core::executor::{HandlerExecutor, ToolHandler};
use crate::core::registry::{ArgumentKind, ArgumentSpec, ToolDescriptor, ToolRegistry};

pub const NAME: &str = "echo";

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(NAME, "Echo a message back to the client.")
        .argument(
            ArgumentSpec::new("message", ArgumentKind::String)
                .describe("The message to echo")
                .required(),
        )
        .argument(
            ArgumentSpec::new("case", ArgumentKind::String)
                .describe("Case conversion applied before echoing")
                .one_of(["upper", "lower", "preserve"]),
        )
}

/// Register the echo tool's descriptor and handler.
pub fn register(registry: &mut ToolRegistry, executor: &mut HandlerExecutor, prefix: &str) {
    let prefix = prefix.to_string();
    let handler: ToolHandler = Arc::new(move |args: Map<String, Value>| {
        let result = echo(&prefix, &args);
        async move { result }.boxed()
    });

    if registry.register(descriptor()) {
        executor.register(NAME, handler);
    }
}

fn echo(prefix: &str, args: &Map<String, Value>) -> Result<Value, String> {
    let message = args
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| "Missing required parameter: message".to_string())?;

    let message = match args.get("case").and_then(Value::as_str) {
        None | Some("preserve") => message.to_string(),
        Some("upper") => message.to_uppercase(),
        Some("lower") => message.to_lowercase(),
        Some(other) => {
            return Err(format!(
                "Invalid value for case: {} (expected upper, lower or preserve)",
                other
            ));
        }
    };

    let mut result = String::with_capacity(prefix.len() + message.len());
    result.push_str(prefix);
    result.push_str(&message);

    Ok(json!({ "result": result }))
}
