/// Tool Registry
///
/// Static catalog of tool descriptors advertised through `tools/list`. The
/// registry is filled once while the server starts and shared read-only after
/// that; it holds no behaviour, only the data clients need to call a tool.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value, json};

/// JSON type of a single tool argument.
#[allow(dead_code)] // not every kind is used by the built-in tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ArgumentKind {
    fn as_str(self) -> &'static str {
        match self {
            ArgumentKind::String => "string",
            ArgumentKind::Number => "number",
            ArgumentKind::Integer => "integer",
            ArgumentKind::Boolean => "boolean",
            ArgumentKind::Object => "object",
            ArgumentKind::Array => "array",
        }
    }
}

/// Schema of one named argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentSpec {
    pub name: String,
    pub kind: ArgumentKind,
    pub description: Option<String>,
    pub required: bool,
    /// Closed set of accepted values, advertised as a JSON Schema `enum`
    pub allowed: Option<Vec<String>>,
}

impl ArgumentSpec {
    pub fn new(name: impl Into<String>, kind: ArgumentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            required: false,
            allowed: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// MCP tool definition.
///
/// Serialized in the shape MCP clients expect from `tools/list`, with the
/// arguments folded into an object-typed `inputSchema`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub arguments: Vec<ArgumentSpec>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: Vec::new(),
        }
    }

    pub fn argument(mut self, spec: ArgumentSpec) -> Self {
        self.arguments.push(spec);
        self
    }

    /// JSON Schema describing the tool's arguments.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for arg in &self.arguments {
            let mut property = Map::new();
            property.insert("type".to_string(), json!(arg.kind.as_str()));
            if let Some(description) = &arg.description {
                property.insert("description".to_string(), json!(description));
            }
            if let Some(allowed) = &arg.allowed {
                property.insert("enum".to_string(), json!(allowed));
            }
            properties.insert(arg.name.clone(), Value::Object(property));
            if arg.required {
                required.push(json!(arg.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

impl Serialize for ToolDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("description", &self.description)?;
        map.serialize_entry("inputSchema", &self.input_schema())?;
        map.end()
    }
}

/// Registry of available MCP tools, in registration order.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor to the catalog.
    ///
    /// Returns `false` and leaves the catalog untouched if the name is
    /// already taken.
    pub fn register(&mut self, tool: ToolDescriptor) -> bool {
        if self.contains(&tool.name) {
            tracing::warn!(tool = %tool.name, "duplicate tool registration ignored");
            return false;
        }
        self.tools.push(tool);
        true
    }

    /// Check whether a tool with this name is already registered.
    ///
    /// # Arguments
    /// * `name` - Tool name as advertised in `tools/list`
    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// All descriptors, in registration order.
    pub fn list_descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the catalog has no tools.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ToolDescriptor {
        ToolDescriptor::new("create_issue", "Create an issue")
            .argument(ArgumentSpec::new("title", ArgumentKind::String).required())
            .argument(
                ArgumentSpec::new("priority", ArgumentKind::String)
                    .describe("Issue priority")
                    .one_of(["low", "high"]),
            )
    }

    #[test]
    fn serializes_in_mcp_tool_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "create_issue",
                "description": "Create an issue",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "priority": {
                            "type": "string",
                            "description": "Issue priority",
                            "enum": ["low", "high"]
                        }
                    },
                    "required": ["title"]
                }
            })
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(sample()));
        assert!(!registry.register(ToolDescriptor::new("create_issue", "other")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_descriptors()[0].description, "Create an issue");
    }

    #[test]
    fn contains_only_registered_names() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.contains("create_issue"));

        registry.register(sample());
        assert!(registry.contains("create_issue"));
        assert!(!registry.contains("Create_Issue"));
        assert!(!registry.is_empty());
    }

    #[test]
    fn listing_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["b", "a", "c"] {
            registry.register(ToolDescriptor::new(name, name));
        }
        let names: Vec<_> = registry.list_descriptors().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }
}
