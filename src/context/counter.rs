//! Token counting for context budgets
//!
//! Two counters share one interface:
//!
//! - **Heuristic**: 1 token ≈ 4 characters, ceiling division. O(n), no tables.
//! - **Cl100k**: the `cl100k_base` BPE used by GPT-4-class models, via `tiktoken-rs`.
//!
//! Both are subadditive over concatenation in practice, which the packer
//! relies on when it sums per-entry counts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

use crate::errors::{RagError, Result};

/// Which counter to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    #[default]
    Heuristic,
    Cl100k,
}

/// Token counter used for budgeting
#[derive(Clone)]
pub enum TokenCounter {
    Heuristic,
    Bpe(Arc<CoreBPE>),
}

impl TokenCounter {
    /// Create the heuristic counter
    pub fn new() -> Self {
        TokenCounter::Heuristic
    }

    /// Create the `cl100k_base` counter
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| RagError::Configuration(format!("failed to load cl100k_base: {}", e)))?;
        Ok(TokenCounter::Bpe(Arc::new(bpe)))
    }

    pub fn from_kind(kind: TokenizerKind) -> Result<Self> {
        match kind {
            TokenizerKind::Heuristic => Ok(Self::new()),
            TokenizerKind::Cl100k => Self::cl100k(),
        }
    }

    /// Count tokens with the configured counter
    pub fn count(&self, text: &str) -> usize {
        match self {
            TokenCounter::Heuristic => self.estimate(text),
            TokenCounter::Bpe(bpe) => bpe.encode_ordinary(text).len(),
        }
    }

    /// Heuristic estimate: ⌈chars / 4⌉
    pub fn estimate(&self, text: &str) -> usize {
        let char_count = text.chars().count();
        (char_count + 3) / 4
    }

    pub fn kind(&self) -> TokenizerKind {
        match self {
            TokenCounter::Heuristic => TokenizerKind::Heuristic,
            TokenCounter::Bpe(_) => TokenizerKind::Cl100k,
        }
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenCounter({:?})", self.kind())
    }
}
