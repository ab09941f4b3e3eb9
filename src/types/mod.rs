//! Type definitions module
//!
//! Values that flow through a request: queries, passages, fused rankings,
//! context blocks and answers.

pub mod query;
pub mod passage;
pub mod answer;

// Re-export commonly used types
pub use query::{Filter, Query, Strategy};
pub use passage::{paragraphs, Passage, RankedPassage, SourceMeta};
pub use answer::{
    Answer, AnswerMetadata, ContextBlock, ContextBudget, ContextEntry, RetrievalOutcome,
    RetrievalStep, StrategyGap,
};
