//! ragpilot - multi-strategy retrieval-augmented answering
//!
//! Retrieves passages from an indexed corpus with one or more strategies
//! (lexical, vector, hybrid, semantic), fuses them into one ranking, packs
//! a token-bounded context and asks a language model for a grounded answer.
//!
//! # Architecture
//!
//! - **providers**: search, embedding and completion contracts plus the
//!   Azure AI Search and (Azure) OpenAI clients
//! - **rag**: fusion, planner, packer and the orchestrator tying them together
//! - **retry**: per-call timeouts and bounded retry
//! - **context**: token counting

pub mod errors;
pub mod types;

pub mod config;
pub mod context;
pub mod providers;
pub mod rag;
pub mod retry;

pub mod cli;
pub mod display;

// Re-export commonly used types
pub use config::RagConfig;
pub use errors::{RagError, Result};
pub use rag::{AnswerOptions, RagOrchestrator};
pub use types::{Answer, Passage, Query, RankedPassage, Strategy};
