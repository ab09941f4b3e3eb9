//! Concurrent strategy execution for one retrieval step

use futures_util::future::join_all;
use std::sync::Arc;

use crate::errors::{RagError, Result};
use crate::providers::{EmbeddingProvider, SearchBackend};
use crate::rag::fusion::StrategyResults;
use crate::retry::{CallKind, CallPolicies};
use crate::types::{Filter, Passage, Strategy, StrategyGap};

/// Search parameters for one step
#[derive(Debug, Clone, Copy)]
pub struct SearchParams<'a> {
    pub top_k: usize,
    pub filter: Option<&'a Filter>,
}

/// Lists that came back, plus the strategies that failed
#[derive(Debug, Clone, Default)]
pub struct StepResults {
    pub results: Vec<StrategyResults>,
    pub gaps: Vec<StrategyGap>,
}

impl StepResults {
    /// All passages of the step, strategy by strategy in request order
    pub fn passages(&self) -> Vec<Passage> {
        self.results
            .iter()
            .flat_map(|r| r.passages.iter().cloned())
            .collect()
    }
}

/// Runs the requested strategies against the search backend
#[derive(Clone)]
pub struct RetrievalEngine {
    search: Arc<dyn SearchBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    policies: CallPolicies,
}

impl RetrievalEngine {
    pub fn new(
        search: Arc<dyn SearchBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        policies: CallPolicies,
    ) -> Self {
        Self {
            search,
            embedder,
            policies,
        }
    }

    /// Execute every strategy for `text` concurrently and join the results.
    ///
    /// The query is embedded once, up front, when any strategy needs a
    /// vector; an embedding failure aborts the step. A failing strategy is
    /// recorded as a gap as long as another one succeeded.
    pub async fn retrieve(
        &self,
        text: &str,
        strategies: &[Strategy],
        params: SearchParams<'_>,
    ) -> Result<StepResults> {
        let vector = if strategies.iter().any(Strategy::needs_vector) {
            let embedder = self.embedder.as_ref();
            Some(
                self.policies
                    .run(CallKind::Embedding, move || embedder.embed(text))
                    .await?,
            )
        } else {
            None
        };
        let vector = vector.as_deref();

        let outcomes = join_all(strategies.iter().map(|&strategy| async move {
            let outcome = self.run_strategy(strategy, text, vector, params).await;
            (strategy, outcome)
        }))
        .await;

        let mut step = StepResults::default();
        for (strategy, outcome) in outcomes {
            match outcome {
                Ok(passages) => {
                    tracing::debug!(%strategy, passages = passages.len(), "strategy returned");
                    step.results.push(StrategyResults::new(strategy, passages));
                }
                Err(e) => {
                    tracing::warn!(%strategy, error = %e, "strategy failed, continuing without it");
                    step.gaps.push(StrategyGap {
                        strategy,
                        error: e.to_string(),
                    });
                }
            }
        }

        if step.results.is_empty() {
            let detail = step
                .gaps
                .iter()
                .map(|g| format!("{}: {}", g.strategy, g.error))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RagError::Retrieval(format!("all strategies failed ({})", detail)));
        }

        Ok(step)
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        text: &str,
        vector: Option<&[f32]>,
        params: SearchParams<'_>,
    ) -> Result<Vec<Passage>> {
        let search = self.search.as_ref();
        let SearchParams { top_k, filter } = params;

        let require_vector = || {
            vector.ok_or_else(|| {
                RagError::Embedding(format!("{} search needs a query vector", strategy))
            })
        };

        match strategy {
            Strategy::Lexical => {
                self.policies
                    .run(CallKind::Search, move || search.search_lexical(text, top_k, filter))
                    .await
            }
            Strategy::Vector => {
                let vector = require_vector()?;
                self.policies
                    .run(CallKind::Search, move || search.search_vector(vector, top_k, filter))
                    .await
            }
            Strategy::Hybrid => {
                let vector = require_vector()?;
                self.policies
                    .run(CallKind::Search, move || {
                        search.search_hybrid(text, vector, top_k, filter)
                    })
                    .await
            }
            Strategy::Semantic => {
                let vector = require_vector()?;
                self.policies
                    .run(CallKind::Search, move || {
                        search.search_semantic(text, vector, top_k, filter)
                    })
                    .await
            }
        }
    }
}
