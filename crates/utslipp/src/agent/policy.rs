//! Orchestration policy: the bounded search/refine/fallback state machine
//!
//! Drives the two tools under hard limits: one broad category-only search,
//! pagination while pages come back saturated, a bounded refinement loop,
//! the unit-filter fallback after three consecutive empty results (at most
//! two cycles), and calculation only when the filter was never disabled on
//! the path that found the selected candidate. No user-visible reply is
//! produced before either a calculation succeeds or the machine concludes
//! calculation is impossible.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::climatiq::{ActivityCandidate, EmissionEstimate, SearchPage};

use super::calculate::CALCULATE_TOOL_ID;
use super::context::AgentContext;
use super::find_activity::FIND_ACTIVITY_TOOL_ID;
use super::planner::{Assessment, Intent, Planner, SearchAttempt};
use super::session::{ConversationState, SearchOutcome, ToolInvocation};
use super::tools::{execute_tool, ToolRegistry};

/// Hard limits for one conversation turn. The prose protocol's soft bounds
/// are promoted to these so the loop always terminates.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Refinement passes allowed before the last-chance assessment.
    pub max_refinement_passes: u32,
    /// Consecutive empty search calls that trigger the unit fallback.
    pub empty_calls_before_fallback: u32,
    /// Full fallback cycles allowed per turn.
    pub max_fallback_cycles: u32,
    /// Fresh search passes allowed within one fallback cycle.
    pub fallback_passes: u32,
    /// Pages requested for a single query/category before pivoting.
    pub max_pages_per_query: u32,
    /// Global cap on tool calls + planner consultations.
    pub max_steps: u32,
    /// Catalog page size; a page of exactly this many results is saturated.
    pub page_size: usize,
    pub tool_timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_refinement_passes: 3,
            empty_calls_before_fallback: 3,
            max_fallback_cycles: 2,
            fallback_passes: 3,
            max_pages_per_query: 5,
            max_steps: 100,
            page_size: 10,
            tool_timeout_secs: 30,
        }
    }
}

/// Terminal outcome of a turn. `Calculated` is only constructible from a
/// successful calculation, so a CO2e figure can never be disclosed without
/// one.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalReply {
    /// Calculation succeeded; the only variant carrying a CO2e figure.
    Calculated {
        estimate: EmissionEstimate,
        rationale: String,
    },
    /// Best-fit activity found with the unit filter disabled; no figure.
    UnitIncompatible {
        activity_id: String,
        activity_name: String,
        rationale: String,
        note: String,
    },
    /// The upstream service rejected the calculation.
    CalculationFailed {
        activity_id: String,
        message: String,
    },
    /// Both fallback cycles exhausted without an acceptable candidate.
    NoMatch { explanation: String },
    /// Off-topic submission; no tool was called.
    Declined { reason: String },
}

/// Lifecycle events streamed while a turn runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEvent {
    Reasoning { text: String },
    ToolInputStreaming { call_id: String, tool: String },
    ToolInputAvailable { call_id: String, tool: String, input: serde_json::Value },
    ToolOutputAvailable { call_id: String, tool: String, output: serde_json::Value },
    ToolOutputError { call_id: String, tool: String, error: String },
    Text { text: String },
    Done { reply: FinalReply },
    Error { message: String },
}

#[derive(Debug)]
pub struct AgentOutcome {
    pub reply: FinalReply,
    pub state: ConversationState,
}

/// One query/category/page combination to search next.
#[derive(Debug, Clone)]
struct QueryPlan {
    query: Option<String>,
    category: Option<String>,
    page: u32,
}

enum SearchCall {
    Page(SearchPage),
    Failed(String),
}

/// What the loop does after an unselective search call.
enum Step {
    Continue,
    FallbackTrigger,
    Unproductive,
}

pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    planner: Arc<dyn Planner>,
    config: PolicyConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<ToolRegistry>, planner: Arc<dyn Planner>, config: PolicyConfig) -> Self {
        Self { registry, planner, config }
    }

    /// Run one turn to a terminal reply, streaming lifecycle events. If the
    /// event receiver is dropped the turn is abandoned and its in-flight
    /// results are discarded.
    pub async fn run(
        &self,
        ctx: &AgentContext,
        events: mpsc::Sender<AgentEvent>,
    ) -> Result<AgentOutcome> {
        let mut state = ConversationState::default();
        let reply = self.drive(ctx, &mut state, &events).await?;

        emit(&events, AgentEvent::Text { text: render_reply(&reply) }).await;
        emit(&events, AgentEvent::Done { reply: reply.clone() }).await;

        tracing::info!(
            session = %ctx.session_id,
            steps = state.steps,
            searches = state.search_calls(),
            "turn finished"
        );
        Ok(AgentOutcome { reply, state })
    }

    async fn drive(
        &self,
        ctx: &AgentContext,
        state: &mut ConversationState,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<FinalReply> {
        emit(events, AgentEvent::Reasoning { text: "Interpreting the submitted activity.".into() }).await;
        let intent = self.planner.interpret(ctx).await?;
        state.steps += 1;

        let category = match intent {
            Intent::OffTopic { reason } => return Ok(FinalReply::Declined { reason }),
            Intent::UseActivity { activity_id } => {
                // Explicit user directive overrides the search heuristics.
                emit(events, AgentEvent::Reasoning {
                    text: format!("Using the user-supplied activity id {activity_id}."),
                }).await;
                return match self.run_calculation(ctx, state, &activity_id, events).await? {
                    Ok(estimate) => Ok(FinalReply::Calculated {
                        estimate,
                        rationale: "Activity id supplied directly by the user.".into(),
                    }),
                    Err(message) => Ok(FinalReply::CalculationFailed { activity_id, message }),
                };
            }
            Intent::Search { category } => category,
        };

        emit(events, AgentEvent::Reasoning {
            text: format!("Starting broad: category-only search in '{category}'."),
        }).await;

        let mut attempts: Vec<SearchAttempt> = Vec::new();
        let mut candidates: Vec<ActivityCandidate> = Vec::new();
        // Per-candidate record of whether the unit filter was disabled when
        // the candidate was first seen. The calculation gate is scoped to
        // the path that found the selected candidate, not to the turn.
        let mut filter_state: HashMap<String, bool> = HashMap::new();
        let mut plan = QueryPlan { query: None, category: Some(category), page: 1 };

        loop {
            if state.steps >= self.config.max_steps {
                tracing::warn!(max = self.config.max_steps, "step budget exhausted");
                return Ok(FinalReply::NoMatch {
                    explanation: "The step budget was exhausted before an acceptable activity was found."
                        .into(),
                });
            }
            if events.is_closed() {
                bail!("submission abandoned; discarding in-flight turn");
            }

            let call = self.run_search(ctx, state, &plan, events).await?;
            attempts.push(SearchAttempt {
                query: plan.query.clone(),
                category: plan.category.clone(),
                page: plan.page,
                unit_filter_disabled: state.unit_filter_disabled,
                result_count: match &call {
                    SearchCall::Page(page) => Some(page.results.len()),
                    SearchCall::Failed(_) => None,
                },
                failed: matches!(call, SearchCall::Failed(_)),
            });

            let step = match call {
                SearchCall::Failed(message) => {
                    // Recorded, but never counted toward the empty-results
                    // trigger.
                    tracing::warn!(error = %message, "search call failed");
                    Step::Unproductive
                }
                SearchCall::Page(page) if page.results.is_empty() => {
                    if state.consecutive_empty >= self.config.empty_calls_before_fallback {
                        Step::FallbackTrigger
                    } else {
                        Step::Unproductive
                    }
                }
                SearchCall::Page(page) => {
                    let page_len = page.results.len();
                    let total = page.total_results;
                    for candidate in page.results {
                        if !candidates.iter().any(|c| c.activity_id == candidate.activity_id) {
                            filter_state
                                .insert(candidate.activity_id.clone(), state.unit_filter_disabled);
                            candidates.push(candidate);
                        }
                    }

                    let assessment = self.planner.assess(ctx, &candidates, false).await?;
                    state.steps += 1;

                    match assessment {
                        Assessment::Select { activity_id, rationale } => {
                            match candidates.iter().find(|c| c.activity_id == activity_id).cloned() {
                                Some(candidate) => {
                                    let filter_disabled = filter_state
                                        .get(&candidate.activity_id)
                                        .copied()
                                        .unwrap_or(state.unit_filter_disabled);
                                    return self
                                        .resolve_selection(
                                            ctx, state, candidate, rationale, filter_disabled,
                                            events,
                                        )
                                        .await;
                                }
                                None => {
                                    tracing::warn!(
                                        activity_id = %activity_id,
                                        "planner selected an id not among the candidates"
                                    );
                                    Step::Unproductive
                                }
                            }
                        }
                        Assessment::NeedMore => {
                            let saturated = page_len == self.config.page_size
                                && total > plan.page as u64 * self.config.page_size as u64;
                            if saturated && plan.page < self.config.max_pages_per_query {
                                plan.page += 1;
                                emit(events, AgentEvent::Reasoning {
                                    text: format!("Page was saturated; requesting page {}.", plan.page),
                                }).await;
                                Step::Continue
                            } else {
                                Step::Unproductive
                            }
                        }
                    }
                }
            };

            match step {
                Step::Continue => continue,
                Step::FallbackTrigger => {
                    if state.fallback_cycles >= self.config.max_fallback_cycles {
                        return self
                            .last_chance(ctx, state, &candidates, &filter_state, events)
                            .await;
                    }
                    let category = self.planner.fallback_category(ctx, &attempts).await?;
                    state.steps += 1;
                    state.begin_fallback_cycle();
                    emit(events, AgentEvent::Reasoning {
                        text: format!(
                            "Three consecutive searches returned nothing; disabling the unit-type \
                             filter and restarting from '{category}' (a match found this way cannot \
                             be converted to CO2e)."
                        ),
                    }).await;
                    plan = QueryPlan { query: None, category: Some(category), page: 1 };
                }
                Step::Unproductive => {
                    if state.unit_filter_disabled {
                        if state.fallback_passes >= self.config.fallback_passes {
                            if state.fallback_cycles >= self.config.max_fallback_cycles {
                                return self
                                    .last_chance(ctx, state, &candidates, &filter_state, events)
                                    .await;
                            }
                            let category = self.planner.fallback_category(ctx, &attempts).await?;
                            state.steps += 1;
                            state.begin_fallback_cycle();
                            plan = QueryPlan { query: None, category: Some(category), page: 1 };
                        } else {
                            let refined = self.planner.refine(ctx, &attempts).await?;
                            state.steps += 1;
                            plan = QueryPlan { query: refined.query, category: refined.category, page: 1 };
                        }
                    } else if state.refinement_passes >= self.config.max_refinement_passes {
                        return self
                            .last_chance(ctx, state, &candidates, &filter_state, events)
                            .await;
                    } else {
                        state.refinement_passes += 1;
                        let refined = self.planner.refine(ctx, &attempts).await?;
                        state.steps += 1;
                        emit(events, AgentEvent::Reasoning {
                            text: format!(
                                "Refining search (pass {}): query={:?} category={:?}.",
                                state.refinement_passes, refined.query, refined.category
                            ),
                        }).await;
                        plan = QueryPlan { query: refined.query, category: refined.category, page: 1 };
                    }
                }
            }
        }
    }

    /// Final assessment over everything seen; if the planner still cannot
    /// select, the turn ends without a match.
    async fn last_chance(
        &self,
        ctx: &AgentContext,
        state: &mut ConversationState,
        candidates: &[ActivityCandidate],
        filter_state: &HashMap<String, bool>,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<FinalReply> {
        if candidates.is_empty() {
            return Ok(no_match_reply());
        }
        let assessment = self.planner.assess(ctx, candidates, true).await?;
        state.steps += 1;
        match assessment {
            Assessment::Select { activity_id, rationale } => {
                match candidates.iter().find(|c| c.activity_id == activity_id).cloned() {
                    Some(candidate) => {
                        let filter_disabled = filter_state
                            .get(&candidate.activity_id)
                            .copied()
                            .unwrap_or(state.unit_filter_disabled);
                        self.resolve_selection(ctx, state, candidate, rationale, filter_disabled, events)
                            .await
                    }
                    None => Ok(no_match_reply()),
                }
            }
            Assessment::NeedMore => Ok(no_match_reply()),
        }
    }

    /// A candidate is selected: calculate if the unit filter was enabled on
    /// the search path that found it, otherwise report the match without a
    /// figure.
    async fn resolve_selection(
        &self,
        ctx: &AgentContext,
        state: &mut ConversationState,
        candidate: ActivityCandidate,
        rationale: String,
        filter_disabled: bool,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<FinalReply> {
        if filter_disabled {
            let domain = ctx
                .domain()
                .map(|d| format!("{:?}", d).to_lowercase())
                .unwrap_or_else(|| "provided".to_string());
            return Ok(FinalReply::UnitIncompatible {
                activity_id: candidate.activity_id,
                activity_name: candidate.name,
                rationale,
                note: format!(
                    "The {domain} unit supplied is incompatible with this activity, so no CO2e \
                     figure could be calculated."
                ),
            });
        }

        match self.run_calculation(ctx, state, &candidate.activity_id, events).await? {
            Ok(estimate) => Ok(FinalReply::Calculated { estimate, rationale }),
            Err(message) => Ok(FinalReply::CalculationFailed {
                activity_id: candidate.activity_id,
                message,
            }),
        }
    }

    async fn run_search(
        &self,
        ctx: &AgentContext,
        state: &mut ConversationState,
        plan: &QueryPlan,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<SearchCall> {
        let call_id = uuid::Uuid::new_v4().to_string();
        let args = serde_json::json!({
            "query": plan.query,
            "category": plan.category,
            "page": plan.page,
            "disable_unit_type_filter": state.unit_filter_disabled,
        });

        emit(events, AgentEvent::ToolInputStreaming {
            call_id: call_id.clone(),
            tool: FIND_ACTIVITY_TOOL_ID.into(),
        }).await;
        emit(events, AgentEvent::ToolInputAvailable {
            call_id: call_id.clone(),
            tool: FIND_ACTIVITY_TOOL_ID.into(),
            input: args.clone(),
        }).await;

        let started = Instant::now();
        let result = execute_tool(
            &self.registry,
            FIND_ACTIVITY_TOOL_ID,
            args.clone(),
            ctx,
            self.config.tool_timeout_secs,
        )
        .await?;
        let duration_ms = started.elapsed().as_millis() as u64;
        state.steps += 1;

        if result.success {
            let page: SearchPage = serde_json::from_value(result.data.clone())
                .context("search tool returned malformed data")?;
            state.record(ToolInvocation {
                tool_name: FIND_ACTIVITY_TOOL_ID.into(),
                arguments: args,
                result: result.data.clone(),
                success: true,
                duration_ms,
            });
            state.note_search_outcome(if page.results.is_empty() {
                SearchOutcome::Empty
            } else {
                SearchOutcome::NonEmpty
            });
            emit(events, AgentEvent::ToolOutputAvailable {
                call_id,
                tool: FIND_ACTIVITY_TOOL_ID.into(),
                output: result.data,
            }).await;
            Ok(SearchCall::Page(page))
        } else {
            let message = result.error.unwrap_or(result.output);
            state.record(ToolInvocation {
                tool_name: FIND_ACTIVITY_TOOL_ID.into(),
                arguments: args,
                result: serde_json::json!({ "error": message }),
                success: false,
                duration_ms,
            });
            state.note_search_outcome(SearchOutcome::Failed);
            emit(events, AgentEvent::ToolOutputError {
                call_id,
                tool: FIND_ACTIVITY_TOOL_ID.into(),
                error: message.clone(),
            }).await;
            Ok(SearchCall::Failed(message))
        }
    }

    /// Returns `Ok(Err(message))` for an upstream rejection; hard failures
    /// (e.g. a missing measurement) propagate as errors and are never
    /// retried.
    async fn run_calculation(
        &self,
        ctx: &AgentContext,
        state: &mut ConversationState,
        activity_id: &str,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<Result<EmissionEstimate, String>> {
        let call_id = uuid::Uuid::new_v4().to_string();
        let args = serde_json::json!({ "activity_id": activity_id });

        emit(events, AgentEvent::ToolInputStreaming {
            call_id: call_id.clone(),
            tool: CALCULATE_TOOL_ID.into(),
        }).await;
        emit(events, AgentEvent::ToolInputAvailable {
            call_id: call_id.clone(),
            tool: CALCULATE_TOOL_ID.into(),
            input: args.clone(),
        }).await;

        let started = Instant::now();
        let result = execute_tool(
            &self.registry,
            CALCULATE_TOOL_ID,
            args.clone(),
            ctx,
            self.config.tool_timeout_secs,
        )
        .await?;
        let duration_ms = started.elapsed().as_millis() as u64;
        state.steps += 1;

        if result.success {
            let estimate: EmissionEstimate = serde_json::from_value(result.data.clone())
                .context("calculation tool returned malformed data")?;
            state.record(ToolInvocation {
                tool_name: CALCULATE_TOOL_ID.into(),
                arguments: args,
                result: result.data.clone(),
                success: true,
                duration_ms,
            });
            emit(events, AgentEvent::ToolOutputAvailable {
                call_id,
                tool: CALCULATE_TOOL_ID.into(),
                output: result.data,
            }).await;
            Ok(Ok(estimate))
        } else {
            let message = result.error.unwrap_or(result.output);
            state.record(ToolInvocation {
                tool_name: CALCULATE_TOOL_ID.into(),
                arguments: args,
                result: serde_json::json!({ "error": message }),
                success: false,
                duration_ms,
            });
            emit(events, AgentEvent::ToolOutputError {
                call_id,
                tool: CALCULATE_TOOL_ID.into(),
                error: message.clone(),
            }).await;
            Ok(Err(message))
        }
    }
}

fn no_match_reply() -> FinalReply {
    FinalReply::NoMatch {
        explanation: "No acceptable activity was found in the catalog for this description, even \
                      after disabling the unit-type filter. Try rephrasing the activity in more \
                      generic terms."
            .into(),
    }
}

fn render_reply(reply: &FinalReply) -> String {
    match reply {
        FinalReply::Calculated { estimate, rationale } => format!(
            "name: {}\nid: {}\nemissions: {} {}\nrationale: {}",
            estimate.activity_name, estimate.activity_id, estimate.co2e, estimate.unit, rationale
        ),
        FinalReply::UnitIncompatible { activity_id, activity_name, rationale, note } => format!(
            "name: {}\nid: {}\nrationale: {}\nnote: {}",
            activity_name, activity_id, rationale, note
        ),
        FinalReply::CalculationFailed { activity_id, message } => format!(
            "The emission for activity id {} could not be calculated: {}",
            activity_id, message
        ),
        FinalReply::NoMatch { explanation } => explanation.clone(),
        FinalReply::Declined { reason } => reason.clone(),
    }
}

async fn emit(events: &mpsc::Sender<AgentEvent>, event: AgentEvent) {
    // An abandoned turn drops the receiver; results are discarded.
    let _ = events.send(event).await;
}
