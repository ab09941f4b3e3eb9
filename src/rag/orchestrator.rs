//! End-to-end answer orchestration
//!
//! planner → search/embedding → fusion → packing → completion.
//!
//! The orchestrator holds only read-only state copied from [`RagConfig`] at
//! construction time, so one instance can serve concurrent requests.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::RagConfig;
use crate::errors::{RagError, Result};
use crate::providers::{CompletionProvider, EmbeddingProvider, SearchBackend};
use crate::rag::fusion::{rank_in_order, ResultFuser, StrategyResults};
use crate::rag::packer::ContextPacker;
use crate::rag::planner::{PlannerConfig, PlannerState, QueryPlanner};
use crate::rag::prompts::PromptSet;
use crate::rag::retrieval::{RetrievalEngine, SearchParams};
use crate::retry::{CallKind, CallPolicies};
use crate::types::{
    Answer, AnswerMetadata, ContextBudget, Filter, Passage, Query, RankedPassage,
    RetrievalOutcome, RetrievalStep, Strategy,
};

/// Per-request options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerOptions {
    /// Primary strategy, used when the query carries no hint
    pub strategy: Strategy,
    /// Extra strategies fused alongside the primary one
    pub additional_strategies: Vec<Strategy>,
    pub multi_step: bool,
    pub max_steps: usize,
    pub novelty_threshold: f64,
    /// Context budget in tokens, prompt reservation included
    pub token_budget: usize,
    /// Results requested per strategy call
    pub top_k: usize,
    pub temperature: f64,
    /// Replaces the configured system prompt for this request
    pub system_prompt: Option<String>,
    pub filter: Option<Filter>,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        let planner = PlannerConfig::default();
        Self {
            strategy: Strategy::Hybrid,
            additional_strategies: Vec::new(),
            multi_step: false,
            max_steps: planner.max_steps,
            novelty_threshold: planner.novelty_threshold,
            token_budget: 2000,
            top_k: 5,
            temperature: 0.7,
            system_prompt: None,
            filter: None,
        }
    }
}

impl AnswerOptions {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.top_k == 0 {
            return Err("top_k must be at least 1".to_string());
        }
        if self.token_budget == 0 {
            return Err("token_budget must be at least 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            ));
        }
        PlannerConfig {
            max_steps: self.max_steps,
            novelty_threshold: self.novelty_threshold,
        }
        .validate()
    }

    /// Planner settings for this request. Single-pass runs exactly one step.
    pub fn planner_config(&self) -> PlannerConfig {
        if self.multi_step {
            PlannerConfig {
                max_steps: self.max_steps,
                novelty_threshold: self.novelty_threshold,
            }
        } else {
            PlannerConfig {
                max_steps: 1,
                novelty_threshold: self.novelty_threshold,
            }
        }
    }

    /// Primary strategy first, then the additional ones, without duplicates
    pub fn strategies(&self, primary: Strategy) -> Vec<Strategy> {
        let mut strategies = vec![primary];
        for &extra in &self.additional_strategies {
            if !strategies.contains(&extra) {
                strategies.push(extra);
            }
        }
        strategies
    }
}

/// Retrieval and fusion without generation
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub strategies: Vec<Strategy>,
    pub steps: Vec<RetrievalStep>,
    /// Every strategy list from every step, in execution order
    pub lists: Vec<StrategyResults>,
    pub fused: Vec<RankedPassage>,
    pub outcome: RetrievalOutcome,
    pub elapsed: Duration,
}

impl Retrieval {
    /// Caller-supplied passages standing in for a search
    pub fn provided(passages: Vec<Passage>) -> Self {
        Self {
            strategies: Vec::new(),
            steps: Vec::new(),
            lists: Vec::new(),
            fused: rank_in_order(passages),
            outcome: RetrievalOutcome::Provided,
            elapsed: Duration::ZERO,
        }
    }

    pub fn passages_retrieved(&self) -> usize {
        match self.outcome {
            RetrievalOutcome::Provided => self.fused.len(),
            _ => self.steps.iter().map(|s| s.passages.len()).sum(),
        }
    }
}

/// Top-level coordinator
pub struct RagOrchestrator {
    retrieval: RetrievalEngine,
    completion: Arc<dyn CompletionProvider>,
    fuser: ResultFuser,
    packer: ContextPacker,
    prompts: PromptSet,
    policies: CallPolicies,
    defaults: AnswerOptions,
}

impl RagOrchestrator {
    pub fn new(
        config: &RagConfig,
        search: Arc<dyn SearchBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Result<Self> {
        config.fusion.validate().map_err(RagError::Configuration)?;
        config
            .defaults
            .validate()
            .map_err(|e| RagError::Configuration(format!("defaults: {}", e)))?;

        let policies = CallPolicies::new(&config.timeouts, &config.retry);

        Ok(Self {
            retrieval: RetrievalEngine::new(search, embedder, policies.clone()),
            completion,
            fuser: ResultFuser::with_weights(config.fusion.clone()),
            packer: ContextPacker::with_config(config.packer.clone())?,
            prompts: config.prompts.clone(),
            policies,
            defaults: config.defaults.clone(),
        })
    }

    /// Options from configuration, as a starting point for callers
    pub fn default_options(&self) -> AnswerOptions {
        self.defaults.clone()
    }

    /// Answer one query
    pub async fn answer(&self, query: Query, options: &AnswerOptions) -> Result<Answer> {
        self.answer_with_cancel(query, options, &CancellationToken::new())
            .await
    }

    /// Answer one query, stopping between steps once `cancel` fires
    pub async fn answer_with_cancel(
        &self,
        query: Query,
        options: &AnswerOptions,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("answer", %request_id, multi_step = options.multi_step);

        self.run_answer(request_id, query, options, cancel)
            .instrument(span)
            .await
    }

    /// Answer from caller-supplied passages without searching the index.
    ///
    /// Passages are packed in the order given, under the same token budget
    /// and exhaustion rules as retrieved ones.
    pub async fn answer_with_passages(
        &self,
        query: Query,
        passages: Vec<Passage>,
        options: &AnswerOptions,
    ) -> Result<Answer> {
        check_request(&query, options)?;
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("answer", %request_id, provided = passages.len());

        let retrieval = Retrieval::provided(passages);
        self.generate(request_id, query, options, retrieval, &CancellationToken::new())
            .instrument(span)
            .await
    }

    /// Retrieve and fuse without calling the completion provider
    pub async fn retrieve(&self, query: &Query, options: &AnswerOptions) -> Result<Retrieval> {
        check_request(query, options)?;
        self.run_retrieval(query, options, &CancellationToken::new())
            .await
    }

    async fn run_answer(
        &self,
        request_id: Uuid,
        query: Query,
        options: &AnswerOptions,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        check_request(&query, options)?;
        let retrieval = self.run_retrieval(&query, options, cancel).await?;
        self.generate(request_id, query, options, retrieval, cancel)
            .await
    }

    /// Pack the fused passages and call the completion provider
    async fn generate(
        &self,
        request_id: Uuid,
        query: Query,
        options: &AnswerOptions,
        retrieval: Retrieval,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let created_at = chrono::Utc::now();

        if retrieval.fused.is_empty() {
            tracing::warn!("no passages retrieved");
            return Err(RagError::ContextExhausted {
                budget: options.token_budget,
                candidates: 0,
            });
        }

        let system_prompt = options
            .system_prompt
            .as_deref()
            .unwrap_or(&self.prompts.system);
        let reserved = self.packer.count_tokens(system_prompt)
            + self
                .packer
                .count_tokens(&self.prompts.render_user("", query.text()));
        let budget = ContextBudget::new(options.token_budget, reserved);

        let context = self.packer.pack(&retrieval.fused, budget);
        if context.is_empty() {
            return Err(RagError::ContextExhausted {
                budget: budget.available(),
                candidates: retrieval.fused.len(),
            });
        }

        if cancel.is_cancelled() {
            return Err(RagError::Cancelled);
        }

        let prompt = self.prompts.render_user(&context.render(), query.text());
        let generation_start = Instant::now();
        let completion = self.completion.as_ref();
        let prompt_ref = prompt.as_str();
        let temperature = options.temperature;
        let text = self
            .policies
            .run(CallKind::Completion, move || {
                completion.complete(prompt_ref, system_prompt, temperature)
            })
            .await?;
        let generation_time = generation_start.elapsed();

        tracing::info!(
            steps = retrieval.steps.len(),
            fused = retrieval.fused.len(),
            packed = context.len(),
            context_tokens = context.total_tokens(),
            retrieval_ms = retrieval.elapsed.as_millis() as u64,
            generation_ms = generation_time.as_millis() as u64,
            "answer generated"
        );

        let metadata = AnswerMetadata {
            request_id,
            created_at,
            strategies: retrieval.strategies.clone(),
            outcome: retrieval.outcome,
            passages_retrieved: retrieval.passages_retrieved(),
            passages_fused: retrieval.fused.len(),
            passages_packed: context.len(),
            retrieval_time: retrieval.elapsed,
            generation_time,
        };

        Ok(Answer {
            query,
            text,
            context,
            steps: retrieval.steps,
            metadata,
        })
    }

    /// Drive the planner through a bounded loop, then fuse everything retrieved
    async fn run_retrieval(
        &self,
        query: &Query,
        options: &AnswerOptions,
        cancel: &CancellationToken,
    ) -> Result<Retrieval> {
        let started = Instant::now();
        let primary = query.strategy().unwrap_or(options.strategy);
        let strategies = options.strategies(primary);
        let params = SearchParams {
            top_k: options.top_k,
            filter: query.filter().or(options.filter.as_ref()),
        };

        let planner_config = options.planner_config();
        let mut planner = QueryPlanner::new(query.text(), planner_config);
        let mut steps: Vec<RetrievalStep> = Vec::new();
        let mut lists: Vec<StrategyResults> = Vec::new();
        let mut retrieved: Vec<Passage> = Vec::new();

        for _ in 0..planner_config.max_steps {
            if cancel.is_cancelled() {
                return Err(RagError::Cancelled);
            }

            let sub_query = match planner
                .next_query(
                    self.completion.as_ref(),
                    &self.prompts,
                    &self.policies,
                    options.temperature,
                    &retrieved,
                )
                .await
            {
                Some(sub_query) => sub_query,
                None => break,
            };

            let step = self.retrieval.retrieve(&sub_query, &strategies, params).await?;
            let passages = step.passages();
            let assessment = planner.record_step(&sub_query, &passages);

            retrieved.extend(passages.iter().cloned());
            steps.push(RetrievalStep {
                index: steps.len() + 1,
                sub_query,
                passages,
                novelty: assessment.novelty,
                is_novel: assessment.is_novel,
                gaps: step.gaps,
            });
            lists.extend(step.results);

            if planner.state().is_terminal() {
                break;
            }
        }

        let outcome = if !options.multi_step {
            RetrievalOutcome::SinglePass
        } else if planner.state() == PlannerState::Converged {
            RetrievalOutcome::Converged
        } else {
            RetrievalOutcome::Exhausted
        };

        let fused = self.fuser.fuse(&lists);
        tracing::debug!(
            steps = steps.len(),
            lists = lists.len(),
            fused = fused.len(),
            ?outcome,
            "retrieval finished"
        );

        Ok(Retrieval {
            strategies,
            steps,
            lists,
            fused,
            outcome,
            elapsed: started.elapsed(),
        })
    }
}

fn check_request(query: &Query, options: &AnswerOptions) -> Result<()> {
    if query.text().trim().is_empty() {
        return Err(RagError::InvalidRequest("query text is empty".to_string()));
    }
    options.validate().map_err(RagError::InvalidRequest)
}
