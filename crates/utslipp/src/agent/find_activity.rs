//! Catalog search tool: find candidate activity ids for an emission activity

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::climatiq::{ClimatiqClient, SearchParams};

use super::context::AgentContext;
use super::tools::{AgentTool, ToolInput, ToolResult};

pub const FIND_ACTIVITY_TOOL_ID: &str = "find_activity_id";

#[derive(Debug, Clone, Deserialize)]
pub struct FindActivityArgs {
    pub query: Option<String>,
    pub category: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub disable_unit_type_filter: bool,
}

fn default_page() -> u32 {
    1
}

pub struct FindActivityTool {
    client: Arc<ClimatiqClient>,
}

impl FindActivityTool {
    pub fn new(client: Arc<ClimatiqClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AgentTool for FindActivityTool {
    fn id(&self) -> &str {
        FIND_ACTIVITY_TOOL_ID
    }

    fn name(&self) -> &str {
        "Find Activity Id"
    }

    fn description(&self) -> &str {
        "Find relevant activity id with emission factor for the given emission activity"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A free text query resembling the emission activity \
                        (e.g. \"electricity\" or \"Fertilizer\"). Do not include a query \
                        term in the first call."
                },
                "category": {
                    "type": "string",
                    "description": "The category of the emission activity (e.g. \"Electricity\" or \"Fuel\")."
                },
                "page": {
                    "type": "integer",
                    "description": "The page number of the results to return. Default is 1.",
                    "default": 1,
                    "minimum": 1
                },
                "disable_unit_type_filter": {
                    "type": "boolean",
                    "description": "Drops the restriction to activities whose unit type matches \
                        the user's measurement. Only to be used after consecutive empty results; \
                        a match found this way cannot be converted into a CO2e figure. \
                        DEFAULTS TO FALSE.",
                    "default": false
                }
            }
        })
    }

    async fn execute(&self, input: ToolInput, context: &AgentContext) -> Result<ToolResult> {
        let args: FindActivityArgs = serde_json::from_value(input.parameters)?;

        // The unit filter is derived from the measurement domain, never
        // user-specified.
        let unit_type = if args.disable_unit_type_filter {
            None
        } else {
            context.domain().map(|d| d.unit_type_filter().to_string())
        };

        let params = SearchParams {
            query: args.query,
            category: args.category,
            page: args.page.max(1),
            unit_type,
        };

        match self.client.search(&params).await {
            Ok(page) => {
                let listing = if page.results.is_empty() {
                    "No results.".to_string()
                } else {
                    page.results
                        .iter()
                        .enumerate()
                        .map(|(i, c)| {
                            format!(
                                "[{}] {} (id: {}, category: {}, unit_type: {})\n{}",
                                i + 1,
                                c.name,
                                c.activity_id,
                                c.category,
                                c.unit_type,
                                c.description
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n---\n")
                };
                let data = serde_json::json!({
                    "total_results": page.total_results,
                    "results": page.results,
                });
                Ok(ToolResult::ok(listing, data))
            }
            Err(e) => {
                tracing::warn!(error = %e, "find_activity_id: catalog search failed");
                Ok(ToolResult::failed(format!("Catalog search failed: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_defaults_match_contract() {
        let args: FindActivityArgs = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(args.page, 1);
        assert!(!args.disable_unit_type_filter);
        assert!(args.query.is_none());
        assert!(args.category.is_none());
    }

    #[test]
    fn args_parse_full_input() {
        let args: FindActivityArgs = serde_json::from_value(serde_json::json!({
            "query": "electricity",
            "category": "Electricity",
            "page": 3,
            "disable_unit_type_filter": true
        }))
        .unwrap();
        assert_eq!(args.query.as_deref(), Some("electricity"));
        assert_eq!(args.page, 3);
        assert!(args.disable_unit_type_filter);
    }
}
