//! Emission calculation tool: compute CO2e for a chosen activity id

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::climatiq::{ClimatiqClient, ClimatiqError};

use super::context::AgentContext;
use super::tools::{AgentTool, ToolInput, ToolResult};

pub const CALCULATE_TOOL_ID: &str = "calculate_emission";

#[derive(Debug, Clone, Deserialize)]
pub struct CalculateArgs {
    pub activity_id: String,
}

pub struct CalculateEmissionTool {
    client: Arc<ClimatiqClient>,
}

impl CalculateEmissionTool {
    pub fn new(client: Arc<ClimatiqClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AgentTool for CalculateEmissionTool {
    fn id(&self) -> &str {
        CALCULATE_TOOL_ID
    }

    fn name(&self) -> &str {
        "Calculate Emission"
    }

    fn description(&self) -> &str {
        "Calculate the emission of an activity after finding the correct id"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "activity_id": {
                    "type": "string",
                    "description": "The activity id chosen from the catalog search results."
                }
            },
            "required": ["activity_id"]
        })
    }

    async fn execute(&self, input: ToolInput, context: &AgentContext) -> Result<ToolResult> {
        let args: CalculateArgs = serde_json::from_value(input.parameters)?;

        // Hard precondition: a measurement must be present in context.
        let measurement = context
            .measurement
            .as_ref()
            .ok_or(ClimatiqError::MissingMeasurement)?;

        match self.client.estimate(&args.activity_id, measurement).await {
            Ok(estimate) => {
                let output = format!(
                    "{} {} CO2e for '{}' (id: {})",
                    estimate.co2e, estimate.unit, estimate.activity_name, estimate.activity_id
                );
                let data = serde_json::to_value(&estimate)?;
                Ok(ToolResult::ok(output, data))
            }
            Err(e) => {
                tracing::warn!(
                    activity_id = %args.activity_id,
                    error = %e,
                    "calculate_emission: estimation failed"
                );
                Ok(ToolResult::failed(format!("Emission calculation failed: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::context::AgentContext;
    use crate::config::UtslippConfig;
    use chrono::Utc;

    #[tokio::test]
    async fn missing_measurement_is_a_hard_failure() {
        let client = Arc::new(ClimatiqClient::new(UtslippConfig::new("test-key")).unwrap());
        let tool = CalculateEmissionTool::new(client);

        let ctx = AgentContext {
            session_id: "s".to_string(),
            created_at: Utc::now(),
            activity: "something".to_string(),
            measurement: None,
            history: Vec::new(),
        };

        let input = ToolInput {
            tool_id: CALCULATE_TOOL_ID.to_string(),
            parameters: serde_json::json!({ "activity_id": "some-id" }),
        };

        let err = tool.execute(input, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("no measurement"));
    }

    #[test]
    fn activity_id_is_required() {
        let parsed: Result<CalculateArgs, _> = serde_json::from_value(serde_json::json!({}));
        assert!(parsed.is_err());
    }
}
