//! Tool trait: the interface the agent loop calls tools through.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use relaybot_core::types::ToolDefinition;

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// A capability the dialogue model may invoke.
///
/// The agent loop advertises `to_definition()` on the planning call and
/// dispatches the model's single invocation to `execute()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call this tool.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the parameters.
    ///
    /// Must be `{"type": "object", "properties": {...}, "required": [...]}`.
    fn parameters(&self) -> Value;

    /// Execute the tool.
    ///
    /// Empty results are reported as text. `Err` is reserved for hard
    /// transport failures, which the caller may retry.
    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Extract a required `String` param.
pub fn require_string(params: &HashMap<String, Value>, key: &str) -> anyhow::Result<String> {
    optional_string(params, key).ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

/// Extract an optional `String` param.
pub fn optional_string(params: &HashMap<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Convert model-supplied JSON arguments into a param map.
///
/// Anything other than a JSON object yields an empty map.
pub fn params_from_value(arguments: &Value) -> HashMap<String, Value> {
    arguments
        .as_object()
        .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}
