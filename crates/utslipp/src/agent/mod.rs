//! Agentic activity lookup: tools, planner seam, and orchestration policy

pub mod calculate;
pub mod context;
pub mod find_activity;
pub mod planner;
pub mod policy;
pub mod prompt;
pub mod session;
pub mod tools;

use std::sync::Arc;

use crate::climatiq::ClimatiqClient;

pub use context::{ActivitySubmission, AgentContext};
pub use planner::{LlmPlanner, Planner};
pub use policy::{AgentEvent, AgentOutcome, FinalReply, Orchestrator, PolicyConfig};

/// Build the standard tool registry: catalog search and emission calculation.
pub fn default_registry(client: Arc<ClimatiqClient>) -> tools::ToolRegistry {
    let mut registry = tools::ToolRegistry::new();
    registry.register(Arc::new(find_activity::FindActivityTool::new(client.clone())));
    registry.register(Arc::new(calculate::CalculateEmissionTool::new(client)));
    registry
}
