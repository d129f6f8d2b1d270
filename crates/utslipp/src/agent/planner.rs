//! Planner seam: the language model as a free-text interpreter
//!
//! The orchestrator owns every control-flow invariant; the planner only
//! answers judgement questions (which category, which candidate, how to
//! narrow the query) and returns structured intents. The default
//! implementation asks a chat model for strict JSON; tests drive the
//! orchestrator with a scripted planner instead.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::climatiq::ActivityCandidate;
use crate::llm::{ChatMessage, LlmClient};

use super::context::AgentContext;
use super::prompt::{categories_block, is_allowed_category, SYSTEM_MESSAGE};

/// What the submission asks for, as interpreted from free text.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Not an emissions-activity request; decline without any tool call.
    OffTopic { reason: String },
    /// The user supplied an explicit activity id; skip search entirely.
    UseActivity { activity_id: String },
    /// Start the protocol with a broad category-only search.
    Search { category: String },
}

/// Judgement over the candidates collected so far.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    Select { activity_id: String, rationale: String },
    NeedMore,
}

/// Narrowed or alternative search terms for a refinement pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefinePlan {
    pub query: Option<String>,
    pub category: Option<String>,
}

/// Summary of one past search call, shown to the planner when refining.
#[derive(Debug, Clone)]
pub struct SearchAttempt {
    pub query: Option<String>,
    pub category: Option<String>,
    pub page: u32,
    pub unit_filter_disabled: bool,
    pub result_count: Option<usize>,
    pub failed: bool,
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Interpret the submission into a structured intent.
    async fn interpret(&self, ctx: &AgentContext) -> Result<Intent>;

    /// Judge the collected candidates. With `last_chance` set the planner
    /// should select the best available candidate if any is acceptable;
    /// `NeedMore` then terminates the turn without a match.
    async fn assess(
        &self,
        ctx: &AgentContext,
        candidates: &[ActivityCandidate],
        last_chance: bool,
    ) -> Result<Assessment>;

    /// Propose narrowed query terms and/or an alternative category.
    async fn refine(&self, ctx: &AgentContext, attempts: &[SearchAttempt]) -> Result<RefinePlan>;

    /// Best-fit generic category to restart from when the unit filter is
    /// being disabled.
    async fn fallback_category(&self, ctx: &AgentContext, attempts: &[SearchAttempt]) -> Result<String>;
}

// ---------------------------------------------------------------------------
// LLM-backed planner
// ---------------------------------------------------------------------------

pub struct LlmPlanner {
    llm: LlmClient,
}

impl LlmPlanner {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    async fn ask_json(&self, ctx: &AgentContext, question: String) -> Result<serde_json::Value> {
        let mut messages = ctx.history.clone();
        messages.push(ChatMessage::user(question));
        let system = format!("{}\n\n{}", SYSTEM_MESSAGE, categories_block());
        let reply = self.llm.complete(&system, &messages).await?;
        let json = extract_json(&reply)
            .ok_or_else(|| anyhow!("planner reply contained no JSON object: {}", reply))?;
        serde_json::from_str(json).context("planner reply was not valid JSON")
    }

    fn describe_submission(ctx: &AgentContext) -> String {
        let measurement = match &ctx.measurement {
            Some(m) => format!(
                "{} ({:?} domain)",
                serde_json::to_string(m).unwrap_or_default(),
                m.domain()
            ),
            None => "none".to_string(),
        };
        format!("Activity: {}\nMeasurement: {}", ctx.activity, measurement)
    }

    fn describe_attempts(attempts: &[SearchAttempt]) -> String {
        attempts
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let outcome = if a.failed {
                    "failed".to_string()
                } else {
                    format!("{} results", a.result_count.unwrap_or(0))
                };
                format!(
                    "{}. query={:?} category={:?} page={} filter_disabled={} -> {}",
                    i + 1,
                    a.query,
                    a.category,
                    a.page,
                    a.unit_filter_disabled,
                    outcome
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn describe_candidates(candidates: &[ActivityCandidate]) -> String {
        candidates
            .iter()
            .map(|c| {
                format!(
                    "- id: {} | name: {} | category: {} | unit_type: {} | {}",
                    c.activity_id, c.name, c.category, c.unit_type, c.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Deserialize)]
struct InterpretReply {
    intent: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    activity_id: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Deserialize)]
struct AssessReply {
    decision: String,
    #[serde(default)]
    activity_id: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Deserialize)]
struct RefineReply {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Deserialize)]
struct FallbackReply {
    category: String,
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn interpret(&self, ctx: &AgentContext) -> Result<Intent> {
        let question = format!(
            "{}\n\nClassify this submission. Reply with exactly one JSON object:\n\
             {{\"intent\": \"off_topic\", \"reason\": \"...\"}} if it is not about an emissions activity,\n\
             {{\"intent\": \"use_activity\", \"activity_id\": \"...\"}} if the user supplied an explicit activity id,\n\
             {{\"intent\": \"search\", \"category\": \"...\"}} otherwise, with the single best-fitting allowed category.",
            Self::describe_submission(ctx)
        );
        let reply: InterpretReply = serde_json::from_value(self.ask_json(ctx, question).await?)?;
        match reply.intent.as_str() {
            "off_topic" => Ok(Intent::OffTopic {
                reason: reply.reason.unwrap_or_else(|| {
                    "This assistant only identifies emission activities and calculates CO2e."
                        .to_string()
                }),
            }),
            "use_activity" => {
                let activity_id = reply
                    .activity_id
                    .ok_or_else(|| anyhow!("use_activity intent without activity_id"))?;
                Ok(Intent::UseActivity { activity_id })
            }
            "search" => {
                let category = reply
                    .category
                    .ok_or_else(|| anyhow!("search intent without category"))?;
                if !is_allowed_category(&category) {
                    tracing::warn!(category = %category, "planner chose an unlisted category");
                }
                Ok(Intent::Search { category })
            }
            other => Err(anyhow!("unknown intent: {}", other)),
        }
    }

    async fn assess(
        &self,
        ctx: &AgentContext,
        candidates: &[ActivityCandidate],
        last_chance: bool,
    ) -> Result<Assessment> {
        let pressure = if last_chance {
            "This is the final opportunity: select the best available candidate if any is an \
             acceptable generic match; otherwise reply need_more to concede no match."
        } else {
            "Select only if one candidate clearly mirrors the activity; otherwise reply need_more."
        };
        let question = format!(
            "{}\n\nCandidates so far:\n{}\n\n{}\nReply with exactly one JSON object:\n\
             {{\"decision\": \"select\", \"activity_id\": \"...\", \"rationale\": \"one sentence\"}} or\n\
             {{\"decision\": \"need_more\"}}",
            Self::describe_submission(ctx),
            Self::describe_candidates(candidates),
            pressure
        );
        let reply: AssessReply = serde_json::from_value(self.ask_json(ctx, question).await?)?;
        match reply.decision.as_str() {
            "select" => {
                let activity_id = reply
                    .activity_id
                    .ok_or_else(|| anyhow!("select decision without activity_id"))?;
                Ok(Assessment::Select {
                    activity_id,
                    rationale: reply
                        .rationale
                        .unwrap_or_else(|| "Closest generic match to the described activity.".to_string()),
                })
            }
            "need_more" => Ok(Assessment::NeedMore),
            other => Err(anyhow!("unknown assessment decision: {}", other)),
        }
    }

    async fn refine(&self, ctx: &AgentContext, attempts: &[SearchAttempt]) -> Result<RefinePlan> {
        let question = format!(
            "{}\n\nSearches so far:\n{}\n\nPropose a narrower search: more specific query terms, \
             a plausible alternative allowed category, or both. Reply with exactly one JSON object:\n\
             {{\"query\": \"...\" or null, \"category\": \"...\" or null}}",
            Self::describe_submission(ctx),
            Self::describe_attempts(attempts)
        );
        let reply: RefineReply = serde_json::from_value(self.ask_json(ctx, question).await?)?;
        if reply.query.is_none() && reply.category.is_none() {
            return Err(anyhow!("refinement plan proposed neither query nor category"));
        }
        Ok(RefinePlan { query: reply.query, category: reply.category })
    }

    async fn fallback_category(&self, ctx: &AgentContext, attempts: &[SearchAttempt]) -> Result<String> {
        let question = format!(
            "{}\n\nSearches so far:\n{}\n\nThe unit-type filter is about to be disabled as a last \
             resort. Name the single best-fit generic allowed category to restart from. Reply with \
             exactly one JSON object: {{\"category\": \"...\"}}",
            Self::describe_submission(ctx),
            Self::describe_attempts(attempts)
        );
        let reply: FallbackReply = serde_json::from_value(self.ask_json(ctx, question).await?)?;
        Ok(reply.category)
    }
}

/// Extract the first top-level JSON object from a model reply, tolerating
/// surrounding prose or code fences.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
