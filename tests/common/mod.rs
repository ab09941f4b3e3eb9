//! Shared test doubles for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use ragpilot::providers::{CompletionProvider, EmbeddingProvider, SearchBackend};
use ragpilot::rag::PromptSet;
use ragpilot::types::{Filter, Passage, Strategy};
use ragpilot::{RagConfig, RagError, RagOrchestrator, Result};

pub fn passage(id: &str, text: &str, score: f64, strategy: Strategy) -> Passage {
    Passage::new(id, text, score, strategy)
}

/// Passages `prefix-1..=prefix-n` with descending scores
pub fn passages(prefix: &str, n: usize, strategy: Strategy) -> Vec<Passage> {
    (1..=n)
        .map(|i| {
            passage(
                &format!("{}-{}", prefix, i),
                &format!("Passage {} about {} and related topics.", i, prefix),
                (n - i + 1) as f64,
                strategy,
            )
        })
        .collect()
}

/// One recorded search call
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub strategy: Strategy,
    pub text: Option<String>,
    pub top_k: usize,
    pub filter: Option<String>,
}

/// Search backend answering from per-strategy and per-query scripts
#[derive(Default)]
pub struct ScriptedSearch {
    by_strategy: HashMap<Strategy, Vec<Passage>>,
    by_query: HashMap<String, Vec<Passage>>,
    failing: HashSet<Strategy>,
    cancel_on_search: Option<CancellationToken>,
    calls: Mutex<Vec<SearchCall>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: Strategy, passages: Vec<Passage>) -> Self {
        self.by_strategy.insert(strategy, passages);
        self
    }

    /// Text queries equal to `text` get these passages, whatever the strategy
    pub fn with_query(mut self, text: &str, passages: Vec<Passage>) -> Self {
        self.by_query.insert(text.to_string(), passages);
        self
    }

    pub fn failing(mut self, strategy: Strategy) -> Self {
        self.failing.insert(strategy);
        self
    }

    /// Fire `token` whenever a search runs, as an interrupt arriving mid-step would
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_search = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Distinct strategies called, in call order
    pub fn strategies_called(&self) -> Vec<Strategy> {
        let mut seen = Vec::new();
        for call in self.calls() {
            if !seen.contains(&call.strategy) {
                seen.push(call.strategy);
            }
        }
        seen
    }

    fn respond(
        &self,
        strategy: Strategy,
        text: Option<&str>,
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>> {
        self.calls.lock().unwrap().push(SearchCall {
            strategy,
            text: text.map(str::to_string),
            top_k,
            filter: filter.map(|f| f.as_str().to_string()),
        });

        if let Some(token) = &self.cancel_on_search {
            token.cancel();
        }

        if self.failing.contains(&strategy) {
            return Err(RagError::Retrieval(format!("{} index unavailable", strategy)));
        }

        let scripted = text
            .and_then(|t| self.by_query.get(t))
            .or_else(|| self.by_strategy.get(&strategy))
            .cloned()
            .unwrap_or_default();

        Ok(scripted
            .into_iter()
            .take(top_k)
            .map(|mut p| {
                p.strategy = strategy;
                p
            })
            .collect())
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearch {
    async fn search_lexical(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>> {
        self.respond(Strategy::Lexical, Some(text), top_k, filter)
    }

    async fn search_vector(
        &self,
        _vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>> {
        self.respond(Strategy::Vector, None, top_k, filter)
    }

    async fn search_hybrid(
        &self,
        text: &str,
        _vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>> {
        self.respond(Strategy::Hybrid, Some(text), top_k, filter)
    }

    async fn search_semantic(
        &self,
        text: &str,
        _vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>> {
        self.respond(Strategy::Semantic, Some(text), top_k, filter)
    }
}

/// Hash-based embedder: identical text gives identical vectors
#[derive(Default)]
pub struct DeterministicEmbedder {
    pub fail: bool,
    calls: AtomicUsize,
}

impl DeterministicEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::Embedding("embedding quota exceeded".to_string()));
        }

        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; 8];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % 8] += byte as f32 / 255.0;
                }
                vector
            })
            .collect())
    }
}

/// Completion provider that counts calls.
///
/// Refinement calls (recognised by the refinement system prompt) pop from a
/// queue and fail once it is empty; answer calls return a fixed reply.
pub struct CountingCompletion {
    answer: Option<String>,
    refinements: Mutex<VecDeque<String>>,
    refinement_system: String,
    answer_calls: AtomicUsize,
    refinement_calls: AtomicUsize,
    last_prompt: Mutex<Option<(String, String)>>,
}

impl CountingCompletion {
    pub fn answering(reply: &str) -> Self {
        Self {
            answer: Some(reply.to_string()),
            refinements: Mutex::new(VecDeque::new()),
            refinement_system: PromptSet::default().refinement_system,
            answer_calls: AtomicUsize::new(0),
            refinement_calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Answer calls fail with a generation error
    pub fn failing() -> Self {
        Self {
            answer: None,
            ..Self::answering("")
        }
    }

    pub fn with_refinements(self, replies: &[&str]) -> Self {
        *self.refinements.lock().unwrap() = replies.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn answer_calls(&self) -> usize {
        self.answer_calls.load(Ordering::SeqCst)
    }

    pub fn refinement_calls(&self) -> usize {
        self.refinement_calls.load(Ordering::SeqCst)
    }

    /// `(prompt, system_prompt)` of the last answer call
    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for CountingCompletion {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        _temperature: f64,
    ) -> Result<String> {
        if system_prompt == self.refinement_system {
            self.refinement_calls.fetch_add(1, Ordering::SeqCst);
            return self
                .refinements
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| RagError::Generation("refinement model unavailable".to_string()));
        }

        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some((prompt.to_string(), system_prompt.to_string()));
        self.answer
            .clone()
            .ok_or_else(|| {
                RagError::Generation("completion endpoint returned HTTP 500".to_string())
            })
    }
}

/// Default configuration with fast retries
pub fn test_config() -> RagConfig {
    let mut config = RagConfig::default();
    config.retry.base_delay_ms = 1;
    config
}

pub fn orchestrator(
    search: &Arc<ScriptedSearch>,
    embedder: &Arc<DeterministicEmbedder>,
    completion: &Arc<CountingCompletion>,
) -> RagOrchestrator {
    RagOrchestrator::new(
        &test_config(),
        search.clone(),
        embedder.clone(),
        completion.clone(),
    )
    .unwrap()
}
