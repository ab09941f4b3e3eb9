//! Query values and retrieval strategies
//!
//! A `Query` is built once per user turn and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Retrieval strategy understood by the search backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Keyword/term matching
    Lexical,
    /// Nearest-neighbour over embeddings
    Vector,
    /// Lexical + vector combined by the backend
    Hybrid,
    /// Hybrid plus backend-side re-ranking
    Semantic,
}

impl Strategy {
    /// All strategies in declaration order
    pub const ALL: [Strategy; 4] = [
        Strategy::Lexical,
        Strategy::Vector,
        Strategy::Hybrid,
        Strategy::Semantic,
    ];

    /// Whether this strategy needs a query embedding
    pub fn needs_vector(&self) -> bool {
        !matches!(self, Strategy::Lexical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Lexical => "lexical",
            Strategy::Vector => "vector",
            Strategy::Hybrid => "hybrid",
            Strategy::Semantic => "semantic",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // "keyword" is what the search service calls lexical search
            "lexical" | "keyword" => Ok(Strategy::Lexical),
            "vector" => Ok(Strategy::Vector),
            "hybrid" => Ok(Strategy::Hybrid),
            "semantic" => Ok(Strategy::Semantic),
            other => Err(format!(
                "unknown strategy '{}' (expected lexical, vector, hybrid or semantic)",
                other
            )),
        }
    }
}

/// Backend filter predicate, passed through verbatim (OData syntax for Azure AI Search)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter(pub String);

impl Filter {
    pub fn new(expression: impl Into<String>) -> Self {
        Self(expression.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Immutable user query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    strategy: Option<Strategy>,
    filter: Option<Filter>,
}

impl Query {
    /// Create a query with no strategy hint or filter
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            strategy: None,
            filter: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn strategy(&self) -> Option<Strategy> {
        self.strategy
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }
}
