//! Context blocks, retrieval steps and final answers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::types::passage::Passage;
use crate::types::query::{Query, Strategy};

/// Token budget for retrieved text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Total tokens the prompt may spend
    pub max_tokens: usize,
    /// Tokens held back for the prompt template, system prompt and query
    pub reserved_tokens: usize,
}

impl ContextBudget {
    pub fn new(max_tokens: usize, reserved_tokens: usize) -> Self {
        Self {
            max_tokens,
            reserved_tokens,
        }
    }

    /// Tokens left for passages
    pub fn available(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserved_tokens)
    }
}

/// One included passage with its attribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub passage_id: String,
    pub attribution: String,
    /// Rendered form (marker + attribution + text)
    pub rendered: String,
    pub tokens: usize,
    pub fused_score: f64,
}

/// Ordered, token-bounded passages handed to the completion provider.
///
/// Immutable once built by the packer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    entries: Vec<ContextEntry>,
    total_tokens: usize,
    budget: ContextBudget,
}

impl ContextBlock {
    pub(crate) fn new(entries: Vec<ContextEntry>, budget: ContextBudget) -> Self {
        let total_tokens = entries.iter().map(|e| e.tokens).sum();
        Self {
            entries,
            total_tokens,
            budget,
        }
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn passage_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.passage_id.as_str()).collect()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Render the block as prompt text, entries separated by blank lines
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.rendered.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A strategy that failed inside an otherwise successful step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyGap {
    pub strategy: Strategy,
    pub error: String,
}

/// One iteration of multi-step retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStep {
    /// 1-based step number
    pub index: usize,
    pub sub_query: String,
    pub passages: Vec<Passage>,
    /// Fraction of identifiers not seen in earlier steps
    pub novelty: f64,
    /// Whether novelty met the threshold
    pub is_novel: bool,
    pub gaps: Vec<StrategyGap>,
}

/// Planner terminal states, as reported on an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalOutcome {
    /// Single-pass retrieval
    SinglePass,
    /// Novelty fell below the threshold
    Converged,
    /// Step cap reached or refinement unavailable
    Exhausted,
    /// Context supplied by the caller; no search ran
    Provided,
}

/// Request bookkeeping carried on the answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub strategies: Vec<Strategy>,
    pub outcome: RetrievalOutcome,
    pub passages_retrieved: usize,
    pub passages_fused: usize,
    pub passages_packed: usize,
    #[serde(with = "duration_ms")]
    pub retrieval_time: Duration,
    #[serde(with = "duration_ms")]
    pub generation_time: Duration,
}

/// Final answer with full provenance. Owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub query: Query,
    pub text: String,
    pub context: ContextBlock,
    pub steps: Vec<RetrievalStep>,
    pub metadata: AnswerMetadata,
}

impl Answer {
    /// Every strategy gap recorded across steps
    pub fn gaps(&self) -> impl Iterator<Item = &StrategyGap> {
        self.steps.iter().flat_map(|s| s.gaps.iter())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
