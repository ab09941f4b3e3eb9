//! Retrieval-augmented answering
//!
//! Components:
//! - Fusion: normalize, weight and merge strategy lists
//! - Planner: multi-step retrieval state machine
//! - Retrieval: concurrent strategy execution per step
//! - Packer: token-bounded context assembly
//! - Orchestrator: end-to-end answer

pub mod fusion;
pub mod orchestrator;
pub mod packer;
pub mod planner;
pub mod prompts;
pub mod retrieval;

// Re-export key types
pub use fusion::{FusionWeights, ResultFuser, StrategyResults};
pub use orchestrator::{AnswerOptions, RagOrchestrator, Retrieval};
pub use packer::{ContextFormat, ContextPacker, PackerConfig};
pub use planner::{PlannerConfig, PlannerState, QueryPlanner};
pub use prompts::PromptSet;
pub use retrieval::{RetrievalEngine, SearchParams, StepResults};
