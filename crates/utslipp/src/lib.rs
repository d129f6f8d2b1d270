//! utslipp — carbon-emissions estimation assistant
//!
//! Two independent paths over the same external estimation capability:
//!
//! - the **agent path**: a bounded search/refine/fallback state machine
//!   that locates the best-matching activity id in the emissions-factor
//!   catalog and calculates a CO2e figure for the user's quantity;
//! - the **direct path**: one free-text estimation call, trading
//!   completeness for latency.
//!
//! All factor data and CO2e arithmetic live upstream; this crate only does
//! orchestration and selection policy.

pub mod agent;
pub mod autopilot;
pub mod climatiq;
pub mod config;
pub mod llm;
pub mod measurements;

pub use agent::{
    ActivitySubmission, AgentContext, AgentEvent, AgentOutcome, FinalReply, LlmPlanner,
    Orchestrator, PolicyConfig,
};
pub use autopilot::{DirectEstimator, TextEstimator};
pub use climatiq::{ActivityCandidate, ClimatiqClient, ClimatiqError, EmissionEstimate};
pub use config::UtslippConfig;
pub use measurements::{Domain, Measurement, MeasurementError, RawMeasurement};
