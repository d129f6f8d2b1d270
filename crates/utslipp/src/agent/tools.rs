//! Tool abstraction: trait, registry, and timeout-guarded execution

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::context::AgentContext;

/// Input for a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_id: String,
    pub parameters: serde_json::Value,
}

/// Result from a tool execution.
///
/// `success: false` with an error string is the graceful failure path
/// (upstream/transport errors); a hard `Err` from `execute` means the tool's
/// preconditions were violated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    /// Human-readable summary of the outcome.
    pub output: String,
    /// Structured payload for the orchestration to consume.
    pub data: serde_json::Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>, data: serde_json::Value) -> Self {
        Self { success: true, output: output.into(), data, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            output: error.clone(),
            data: serde_json::json!({}),
            error: Some(error),
        }
    }
}

/// Trait for tools the orchestration can invoke.
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Unique identifier for this tool.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Description of what this tool does.
    fn description(&self) -> &str;

    /// Parameter schema (JSON Schema format).
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input.
    async fn execute(&self, input: ToolInput, context: &AgentContext) -> Result<ToolResult>;
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.insert(tool.id().to_string(), tool);
    }

    pub fn get(&self, tool_id: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.get(tool_id).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Tool descriptions for prompting.
    pub fn descriptions(&self) -> Vec<ToolDescription> {
        self.tools
            .values()
            .map(|tool| ToolDescription {
                id: tool.id().to_string(),
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters_schema: tool.parameters_schema(),
            })
            .collect()
    }
}

/// Tool description for LLM prompting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescription {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Execute a tool from the registry with a timeout guard.
pub async fn execute_tool(
    registry: &ToolRegistry,
    tool_id: &str,
    parameters: serde_json::Value,
    context: &AgentContext,
    timeout_secs: u64,
) -> Result<ToolResult> {
    let tool = registry
        .get(tool_id)
        .ok_or_else(|| anyhow!("Unknown tool: {}", tool_id))?;

    let input = ToolInput { tool_id: tool_id.to_string(), parameters };
    let future = tool.execute(input, context);

    match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), future).await {
        Ok(result) => result,
        Err(_) => Ok(ToolResult::failed(format!(
            "Tool '{}' timed out after {}s",
            tool_id, timeout_secs
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::context::ActivitySubmission;
    use crate::measurements::RawMeasurement;

    struct SlowTool;

    #[async_trait]
    impl AgentTool for SlowTool {
        fn id(&self) -> &str {
            "slow"
        }
        fn name(&self) -> &str {
            "Slow"
        }
        fn description(&self) -> &str {
            "Never finishes in time"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _input: ToolInput, _context: &AgentContext) -> Result<ToolResult> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(ToolResult::ok("done", serde_json::json!({})))
        }
    }

    fn test_context() -> AgentContext {
        AgentContext::for_submission(&ActivitySubmission {
            activity: "test".to_string(),
            measurement: RawMeasurement {
                amount: 1.0,
                unit: "kWh".to_string(),
                domain: "ENERGY".to_string(),
            },
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_failed_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool));

        let result = execute_tool(&registry, "slow", serde_json::json!({}), &test_context(), 1)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn unknown_tool_is_hard_error() {
        let registry = ToolRegistry::new();
        let err = execute_tool(&registry, "nope", serde_json::json!({}), &test_context(), 1).await;
        assert!(err.is_err());
    }
}
