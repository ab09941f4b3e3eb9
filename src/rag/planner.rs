//! Multi-step retrieval planner
//!
//! State machine driving iterative retrieval:
//!
//! ```text
//! Initial ──step──▶ Refining ──step──▶ Refining …
//!    │                 │
//!    └─────────────────┴──▶ Converged  (novelty below threshold)
//!                       └──▶ Exhausted (step cap, or refinement failed)
//! ```
//!
//! Termination depends only on passage identifiers and the step counter,
//! never on generated text, so it is deterministic for identical inputs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::providers::CompletionProvider;
use crate::rag::prompts::PromptSet;
use crate::retry::{CallKind, CallPolicies};
use crate::types::Passage;

/// Planner states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerState {
    /// Nothing retrieved yet; the next query is the original one
    Initial,
    /// Sub-queries are being generated
    Refining,
    /// Last step added too little new material (terminal)
    Converged,
    /// Step cap reached or refinement failed (terminal)
    Exhausted,
}

/// Events that move the planner
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlannerEvent {
    /// A retrieval step finished
    StepRecorded { novel: bool, at_cap: bool },
    /// Sub-query generation failed or produced nothing usable
    RefinementFailed,
}

impl PlannerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlannerState::Converged | PlannerState::Exhausted)
    }

    /// Transition function. Terminal states absorb every event.
    pub fn transition(self, event: PlannerEvent) -> PlannerState {
        use PlannerEvent::*;
        use PlannerState::*;

        match (self, event) {
            (Converged, _) => Converged,
            (Exhausted, _) => Exhausted,
            (_, StepRecorded { novel: false, .. }) => Converged,
            (_, StepRecorded { at_cap: true, .. }) => Exhausted,
            (_, StepRecorded { .. }) => Refining,
            (_, RefinementFailed) => Exhausted,
        }
    }
}

/// Planner tunables, taken from the request options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerConfig {
    /// Hard cap on retrieval steps
    pub max_steps: usize,
    /// Minimum share of new passage ids for a step to count as novel
    pub novelty_threshold: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_steps: 3,
            novelty_threshold: 0.2,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_steps == 0 {
            return Err("max_steps must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.novelty_threshold) {
            return Err(format!(
                "novelty_threshold must be within [0, 1], got {}",
                self.novelty_threshold
            ));
        }
        Ok(())
    }
}

/// Outcome of recording one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepAssessment {
    pub novelty: f64,
    pub is_novel: bool,
}

/// Per-request query planner. Holds the ids seen so far and the queries issued.
#[derive(Debug)]
pub struct QueryPlanner {
    config: PlannerConfig,
    original: String,
    state: PlannerState,
    steps_taken: usize,
    seen: HashSet<String>,
    issued: Vec<String>,
}

impl QueryPlanner {
    pub fn new(original: impl Into<String>, config: PlannerConfig) -> Self {
        Self {
            config,
            original: original.into(),
            state: PlannerState::Initial,
            steps_taken: 0,
            seen: HashSet::new(),
            issued: Vec::new(),
        }
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal() || self.steps_taken >= self.config.max_steps
    }

    /// Share of distinct ids in `passages` not seen in earlier steps.
    /// An empty step has novelty 0.
    pub fn novelty(&self, passages: &[Passage]) -> f64 {
        let distinct: HashSet<&str> = passages.iter().map(|p| p.id.as_str()).collect();
        if distinct.is_empty() {
            return 0.0;
        }
        let new = distinct.iter().filter(|id| !self.seen.contains(**id)).count();
        new as f64 / distinct.len() as f64
    }

    /// Record a finished retrieval step and advance the state machine
    pub fn record_step(&mut self, sub_query: &str, passages: &[Passage]) -> StepAssessment {
        let novelty = self.novelty(passages);
        let is_novel = novelty >= self.config.novelty_threshold;

        self.steps_taken += 1;
        self.issued.push(sub_query.to_string());
        self.seen.extend(passages.iter().map(|p| p.id.clone()));

        let at_cap = self.steps_taken >= self.config.max_steps;
        let next = self.state.transition(PlannerEvent::StepRecorded {
            novel: is_novel,
            at_cap,
        });

        tracing::debug!(
            step = self.steps_taken,
            novelty,
            is_novel,
            from = ?self.state,
            to = ?next,
            "planner step recorded"
        );
        self.state = next;

        StepAssessment { novelty, is_novel }
    }

    /// Next query to issue, or `None` once the planner has stopped.
    ///
    /// `Initial` yields the original query verbatim. `Refining` asks the
    /// completion provider for a sub-query; any failure degrades to
    /// `Exhausted` instead of propagating.
    pub async fn next_query(
        &mut self,
        completion: &dyn CompletionProvider,
        prompts: &PromptSet,
        policies: &CallPolicies,
        temperature: f64,
        retrieved: &[Passage],
    ) -> Option<String> {
        if self.is_finished() {
            return None;
        }

        match self.state {
            PlannerState::Initial => Some(self.original.clone()),
            PlannerState::Refining => {
                match self
                    .generate_sub_query(completion, prompts, policies, temperature, retrieved)
                    .await
                {
                    Some(query) => Some(query),
                    None => {
                        self.state = self.state.transition(PlannerEvent::RefinementFailed);
                        None
                    }
                }
            }
            PlannerState::Converged | PlannerState::Exhausted => None,
        }
    }

    async fn generate_sub_query(
        &self,
        completion: &dyn CompletionProvider,
        prompts: &PromptSet,
        policies: &CallPolicies,
        temperature: f64,
        retrieved: &[Passage],
    ) -> Option<String> {
        let gaps = coverage_gaps(&self.original, retrieved);
        let summary = retrieved_summary(retrieved);
        let prompt = prompts.render_refinement(&self.original, &gaps, &summary, &self.issued);

        let prompt = prompt.as_str();
        let system = prompts.refinement_system.as_str();
        let result = policies
            .run(CallKind::Completion, move || {
                completion.complete(prompt, system, temperature)
            })
            .await;

        match result {
            Ok(raw) => {
                let parsed = parse_sub_query(&raw);
                if parsed.is_none() {
                    tracing::warn!("refinement returned no usable query, stopping");
                }
                parsed
            }
            Err(e) => {
                tracing::warn!(error = %e, "refinement failed, keeping passages retrieved so far");
                None
            }
        }
    }
}

/// Query terms (longer than 3 chars) that no retrieved passage mentions
pub fn coverage_gaps(query: &str, passages: &[Passage]) -> Vec<String> {
    let corpus: Vec<String> = passages.iter().map(|p| p.text.to_lowercase()).collect();
    let mut gaps: Vec<String> = Vec::new();

    for term in query
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 3)
    {
        if gaps.contains(&term) {
            continue;
        }
        if !corpus.iter().any(|text| text.contains(&term)) {
            gaps.push(term);
        }
    }

    gaps
}

/// Short labels for the most recent passages, for the refinement prompt
fn retrieved_summary(passages: &[Passage]) -> Vec<String> {
    const MAX_LABELS: usize = 5;

    let mut labels: Vec<String> = Vec::new();
    for passage in passages.iter().rev() {
        let label = passage
            .source
            .title
            .clone()
            .unwrap_or_else(|| passage.id.clone());
        if !labels.contains(&label) {
            labels.push(label);
        }
        if labels.len() == MAX_LABELS {
            break;
        }
    }
    labels
}

/// Drop a leading `1.`, `2)`, `-` or `*` list marker
fn strip_list_marker(line: &str) -> &str {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let rest = &line[digits..];
    if digits > 0 && (rest.starts_with('.') || rest.starts_with(')')) {
        return rest[1..].trim_start();
    }
    if digits == 0 && (rest.starts_with("- ") || rest.starts_with("* ")) {
        return rest[2..].trim_start();
    }
    line
}

/// First non-empty line of a generated reply, without list numbering or quotes
pub fn parse_sub_query(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;

    let without_number = strip_list_marker(line);

    let cleaned = without_number
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
