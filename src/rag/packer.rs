//! Token-bounded context packing
//!
//! Walks the fused ranking in order and greedily includes each passage whose
//! rendered entry still fits. A passage that would overflow is skipped, not
//! truncated, and packing continues so shorter lower-ranked passages can
//! still fill the remaining budget.

use serde::{Deserialize, Serialize};

use crate::context::{TokenCounter, TokenizerKind};
use crate::errors::Result;
use crate::types::{ContextBlock, ContextBudget, ContextEntry, RankedPassage};

/// Separator placed between rendered entries
const ENTRY_SEPARATOR: &str = "\n\n";

/// Packing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackerConfig {
    /// Token counter used for estimates
    pub tokenizer: TokenizerKind,
    /// Presentation of each entry
    pub format: ContextFormat,
    /// Show the fused score next to the attribution
    pub include_scores: bool,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            tokenizer: TokenizerKind::Heuristic,
            format: ContextFormat::Structured,
            include_scores: false,
        }
    }
}

/// Format for presenting context entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextFormat {
    /// `[Source n: attribution]` header line, then the text
    Structured,
    /// `n. (attribution) text` on one line
    Numbered,
}

/// Selects and renders passages within a budget
#[derive(Debug, Clone)]
pub struct ContextPacker {
    counter: TokenCounter,
    config: PackerConfig,
}

impl ContextPacker {
    /// Heuristic counter, structured format
    pub fn new() -> Self {
        Self {
            counter: TokenCounter::new(),
            config: PackerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(config: PackerConfig) -> Result<Self> {
        Ok(Self {
            counter: TokenCounter::from_kind(config.tokenizer)?,
            config,
        })
    }

    /// Token count with this packer's counter
    pub fn count_tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Pack ranked passages into a block no larger than `budget.available()`.
    ///
    /// Each entry is charged for its leading separator, so the rendered
    /// block never costs more than the sum of entry counts.
    pub fn pack(&self, ranked: &[RankedPassage], budget: ContextBudget) -> ContextBlock {
        let available = budget.available();
        let mut entries: Vec<ContextEntry> = Vec::new();
        let mut used = 0usize;

        for candidate in ranked {
            let marker = entries.len() + 1;
            let attribution = candidate.passage.source.attribution();
            let rendered = self.render_entry(marker, &attribution, candidate);

            let charged = if entries.is_empty() {
                self.counter.count(&rendered)
            } else {
                self.counter.count(&format!("{}{}", ENTRY_SEPARATOR, rendered))
            };

            if used + charged > available {
                tracing::trace!(
                    passage = %candidate.passage.id,
                    rank = candidate.rank,
                    tokens = charged,
                    remaining = available - used,
                    "passage skipped, does not fit"
                );
                continue;
            }

            used += charged;
            entries.push(ContextEntry {
                passage_id: candidate.passage.id.clone(),
                attribution,
                rendered,
                tokens: charged,
                fused_score: candidate.fused_score,
            });
        }

        tracing::debug!(
            packed = entries.len(),
            candidates = ranked.len(),
            tokens = used,
            available,
            "context packed"
        );

        ContextBlock::new(entries, budget)
    }

    fn render_entry(&self, marker: usize, attribution: &str, ranked: &RankedPassage) -> String {
        let label = if self.config.include_scores {
            format!("{} | score {:.2}", attribution, ranked.fused_score)
        } else {
            attribution.to_string()
        };
        let text = ranked.passage.text.trim();

        match self.config.format {
            ContextFormat::Structured => format!("[Source {}: {}]\n{}", marker, label, text),
            ContextFormat::Numbered => format!("{}. ({}) {}", marker, label, text),
        }
    }

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }
}

impl Default for ContextPacker {
    fn default() -> Self {
        Self::new()
    }
}
