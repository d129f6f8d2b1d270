//! Conversation state for one turn: invocation log and retry counters
//!
//! The prose retry rules ("three consecutive empty calls", "at most two
//! fallback cycles", "2-3 refinement passes") are promoted to hard counters
//! here so termination never depends on cooperative behavior.

use serde::Serialize;

/// A single tool invocation record for observability.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: serde_json::Value,
    pub success: bool,
    pub duration_ms: u64,
}

/// Outcome of one catalog search call, as seen by the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Zero candidates returned. The only outcome that advances the
    /// unit-fallback trigger.
    Empty,
    /// At least one candidate returned.
    NonEmpty,
    /// Transport or upstream failure. Recorded, but never counted as empty.
    Failed,
}

/// State owned exclusively by one conversation turn. Append-only: nothing
/// is deleted until the turn produces a terminal reply.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationState {
    pub invocations: Vec<ToolInvocation>,
    /// Consecutive search calls that returned zero results.
    pub consecutive_empty: u32,
    /// Refinement passes consumed (outside fallback).
    pub refinement_passes: u32,
    /// Completed or in-progress unit-fallback cycles.
    pub fallback_cycles: u32,
    /// Search passes consumed within the current fallback cycle.
    pub fallback_passes: u32,
    /// Whether the unit-type filter has been disabled this turn.
    pub unit_filter_disabled: bool,
    /// Total reasoning/tool steps taken.
    pub steps: u32,
}

impl ConversationState {
    pub fn record(&mut self, invocation: ToolInvocation) {
        self.invocations.push(invocation);
    }

    /// Update the empty-results counter after a search call.
    pub fn note_search_outcome(&mut self, outcome: SearchOutcome) {
        match outcome {
            SearchOutcome::Empty => self.consecutive_empty += 1,
            // A transport error or a non-empty result resets the counter.
            SearchOutcome::NonEmpty | SearchOutcome::Failed => self.consecutive_empty = 0,
        }
        if self.unit_filter_disabled {
            self.fallback_passes += 1;
        }
    }

    /// Enter a fresh unit-fallback cycle: disable the filter and reset the
    /// per-cycle counters.
    pub fn begin_fallback_cycle(&mut self) {
        self.fallback_cycles += 1;
        self.fallback_passes = 0;
        self.consecutive_empty = 0;
        self.unit_filter_disabled = true;
    }

    pub fn search_calls(&self) -> usize {
        self.invocations
            .iter()
            .filter(|i| i.tool_name == super::find_activity::FIND_ACTIVITY_TOOL_ID)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_results_advance_the_counter() {
        let mut state = ConversationState::default();
        state.note_search_outcome(SearchOutcome::Empty);
        state.note_search_outcome(SearchOutcome::Empty);
        assert_eq!(state.consecutive_empty, 2);
    }

    #[test]
    fn non_empty_resets_the_counter() {
        let mut state = ConversationState::default();
        state.note_search_outcome(SearchOutcome::Empty);
        state.note_search_outcome(SearchOutcome::Empty);
        state.note_search_outcome(SearchOutcome::NonEmpty);
        assert_eq!(state.consecutive_empty, 0);
    }

    #[test]
    fn transport_failure_resets_the_counter() {
        let mut state = ConversationState::default();
        state.note_search_outcome(SearchOutcome::Empty);
        state.note_search_outcome(SearchOutcome::Empty);
        state.note_search_outcome(SearchOutcome::Failed);
        assert_eq!(state.consecutive_empty, 0);
    }

    #[test]
    fn fallback_cycle_resets_per_cycle_counters() {
        let mut state = ConversationState::default();
        state.note_search_outcome(SearchOutcome::Empty);
        state.note_search_outcome(SearchOutcome::Empty);
        state.note_search_outcome(SearchOutcome::Empty);
        assert_eq!(state.consecutive_empty, 3);

        state.begin_fallback_cycle();
        assert_eq!(state.fallback_cycles, 1);
        assert_eq!(state.consecutive_empty, 0);
        assert_eq!(state.fallback_passes, 0);
        assert!(state.unit_filter_disabled);
    }

    #[test]
    fn fallback_passes_count_searches_while_filter_disabled() {
        let mut state = ConversationState::default();
        state.note_search_outcome(SearchOutcome::Empty);
        assert_eq!(state.fallback_passes, 0);

        state.begin_fallback_cycle();
        state.note_search_outcome(SearchOutcome::Empty);
        state.note_search_outcome(SearchOutcome::NonEmpty);
        assert_eq!(state.fallback_passes, 2);
    }
}
