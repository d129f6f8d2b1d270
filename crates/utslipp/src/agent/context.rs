//! Per-turn execution context for the agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;
use crate::measurements::{Domain, Measurement, MeasurementError, RawMeasurement};

/// One submitted activity: free-text description plus the form measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySubmission {
    pub activity: String,
    pub measurement: RawMeasurement,
}

/// Context owned by a single conversation turn. Immutable once built; a new
/// submission gets a fresh context and the old one is discarded.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    /// The user's activity description.
    pub activity: String,
    /// Converted measurement; absent only when the turn carries no
    /// submission, in which case calculation is impossible.
    pub measurement: Option<Measurement>,
    /// Prior conversation turns, for planner context.
    pub history: Vec<ChatMessage>,
}

impl AgentContext {
    /// Build a context from a submission, validating the measurement up
    /// front so malformed input is rejected before any tool call.
    pub fn for_submission(submission: &ActivitySubmission) -> Result<Self, MeasurementError> {
        let measurement = Measurement::convert(&submission.measurement)?;
        Ok(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            activity: submission.activity.clone(),
            measurement: Some(measurement),
            history: Vec::new(),
        })
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn domain(&self) -> Option<Domain> {
        self.measurement.map(|m| m.domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_context_from_valid_submission() {
        let submission = ActivitySubmission {
            activity: "Grid electricity".to_string(),
            measurement: RawMeasurement {
                amount: 1500.0,
                unit: "kWh".to_string(),
                domain: "ENERGY".to_string(),
            },
        };
        let ctx = AgentContext::for_submission(&submission).unwrap();
        assert_eq!(ctx.domain(), Some(Domain::Energy));
        assert_eq!(ctx.activity, "Grid electricity");
    }

    #[test]
    fn rejects_malformed_measurement() {
        let submission = ActivitySubmission {
            activity: "Mystery".to_string(),
            measurement: RawMeasurement {
                amount: 1.0,
                unit: "kg".to_string(),
                domain: "MASS".to_string(),
            },
        };
        assert!(AgentContext::for_submission(&submission).is_err());
    }
}
