//! Context management module
//!
//! Token counting used for context budgets.

pub mod counter;

// Re-export commonly used types
pub use counter::{TokenCounter, TokenizerKind};
