//! Tool, resource, and prompt descriptors (the catalog's entry shape).
//!
//! The catalog itself — the mapping from tool name to callable — is an
//! external collaborator the core is merely handed; this module
//! only defines the immutable metadata shape the core serializes in
//! `tools/list` and validates against in `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable tool descriptor, unique by `name` within a catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
    /// Tool needs a non-empty bearer token before it can be invoked.
    #[serde(skip)]
    pub requires_auth: bool,
    /// Names the tool must be able to read via `ToolContext::get_secret`.
    #[serde(skip)]
    pub requires_secrets: Vec<String>,
}

impl ToolDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
            output_schema: None,
            annotations: None,
            requires_auth: false,
            requires_secrets: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    #[must_use]
    pub fn requiring_secrets(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.requires_secrets = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Client-facing hints about a tool's behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolAnnotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    #[serde(rename = "destructiveHint", skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
}

/// A resource descriptor returned by `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A prompt descriptor returned by `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_secret_flags_are_not_serialized() {
        let tool = ToolDescriptor::new("echo", serde_json::json!({"type": "object"}))
            .requiring_auth()
            .requiring_secrets(["api_key"]);
        let value = serde_json::to_value(&tool).unwrap();
        assert!(value.get("requires_auth").is_none());
        assert!(value.get("requiresAuth").is_none());
        assert!(tool.requires_auth);
        assert_eq!(tool.requires_secrets, vec!["api_key".to_string()]);
    }
}
