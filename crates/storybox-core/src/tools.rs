//! Tool schema types.
//!
//! The schema half of a tool — what gets pushed to the realtime agent
//! channel. Handlers live in `storybox-tools`; the schema lives here so the
//! channel trait can speak it without a dependency cycle.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// JSON Schema-compatible parameter definition for a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Top-level JSON Schema type.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property definitions (when type is `object`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    /// Required property names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ParameterSchema {
    /// An object schema with the given `(name, description)` string
    /// properties, all required.
    #[must_use]
    pub fn object(props: &[(&str, &str)]) -> Self {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, description) in props {
            let _ = properties.insert(
                (*name).to_owned(),
                json!({ "type": "string", "description": description }),
            );
            required.push((*name).to_owned());
        }
        Self {
            schema_type: "object".to_owned(),
            properties: Some(properties),
            required: Some(required),
        }
    }

    /// An object schema with no parameters.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            schema_type: "object".to_owned(),
            properties: Some(Map::new()),
            required: None,
        }
    }

    /// Add a required nested object property with its own string properties.
    #[must_use]
    pub fn with_object(mut self, name: &str, description: &str, props: &[(&str, &str)]) -> Self {
        let nested = Self::object(props);
        let value = json!({
            "type": "object",
            "description": description,
            "properties": nested.properties,
            "required": nested.required,
        });
        let _ = self
            .properties
            .get_or_insert_with(Map::new)
            .insert(name.to_owned(), value);
        self.required
            .get_or_insert_with(Vec::new)
            .push(name.to_owned());
        self
    }
}

/// A tool definition that can be sent to the realtime agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: ParameterSchema,
}
