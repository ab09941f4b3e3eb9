//! End-to-end orchestrator scenarios against scripted providers

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use common::*;
use ragpilot::types::{paragraphs, Filter, RetrievalOutcome};
use ragpilot::{AnswerOptions, Query, RagError, RagOrchestrator, Strategy};

fn single_pass(strategy: Strategy, top_k: usize, token_budget: usize) -> AnswerOptions {
    AnswerOptions {
        strategy,
        multi_step: false,
        top_k,
        token_budget,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_hybrid_single_pass_answer() {
    let retrieved = passages("ml", 5, Strategy::Hybrid);
    let search = Arc::new(ScriptedSearch::new().with(Strategy::Hybrid, retrieved.clone()));
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("Machine learning is..."));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let answer = orchestrator
        .answer(
            Query::new("What is machine learning?"),
            &single_pass(Strategy::Hybrid, 5, 500),
        )
        .await
        .unwrap();

    // Exactly one hybrid search
    let calls = search.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].strategy, Strategy::Hybrid);
    assert_eq!(calls[0].top_k, 5);
    assert_eq!(embedder.calls(), 1);

    assert_eq!(answer.text, "Machine learning is...");
    assert_eq!(answer.steps.len(), 1);
    assert_eq!(answer.steps[0].sub_query, "What is machine learning?");
    assert_eq!(answer.metadata.passages_retrieved, 5);
    assert_eq!(answer.metadata.passages_fused, 5);
    assert_eq!(answer.metadata.outcome, RetrievalOutcome::SinglePass);

    let retrieved_ids: BTreeSet<&str> = retrieved.iter().map(|p| p.id.as_str()).collect();
    let packed = answer.context.passage_ids();
    assert!(!packed.is_empty());
    assert!(packed.iter().all(|id| retrieved_ids.contains(id)));
    assert!(answer.context.total_tokens() <= 500);

    // The prompt carries the rendered context and the query
    let (prompt, system) = completion.last_prompt().unwrap();
    assert!(prompt.contains(&answer.context.render()));
    assert!(prompt.contains("What is machine learning?"));
    assert_eq!(system, ragpilot::rag::PromptSet::default().system);
    assert_eq!(completion.answer_calls(), 1);
}

#[tokio::test]
async fn test_same_passage_from_three_strategies() {
    let search = Arc::new(
        ScriptedSearch::new()
            .with(Strategy::Lexical, vec![passage("doc-42", "The answer.", 0.9, Strategy::Lexical)])
            .with(Strategy::Vector, vec![passage("doc-42", "The answer.", 0.8, Strategy::Vector)])
            .with(Strategy::Hybrid, vec![passage("doc-42", "The answer.", 0.95, Strategy::Hybrid)]),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("42"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let options = AnswerOptions {
        strategy: Strategy::Lexical,
        additional_strategies: vec![Strategy::Vector, Strategy::Hybrid],
        ..Default::default()
    };
    let retrieval = orchestrator
        .retrieve(&Query::new("the question"), &options)
        .await
        .unwrap();

    assert_eq!(retrieval.lists.len(), 3);
    assert_eq!(retrieval.fused.len(), 1);

    let fused = &retrieval.fused[0];
    assert_eq!(fused.id(), "doc-42");
    assert_eq!(
        fused.provenance,
        BTreeSet::from([Strategy::Lexical, Strategy::Vector, Strategy::Hybrid])
    );
    // Single-element lists normalize to 1.0, so the hybrid weight wins
    assert!((fused.weighted_score - 1.2).abs() < 1e-9);
    assert!((fused.fused_score - 1.0).abs() < 1e-9);
    assert_eq!(completion.answer_calls(), 0);

    let answer = orchestrator
        .answer(Query::new("the question"), &options)
        .await
        .unwrap();
    assert_eq!(answer.context.passage_ids(), vec!["doc-42"]);
    assert_eq!(answer.metadata.passages_retrieved, 3);
    assert_eq!(answer.metadata.passages_fused, 1);
}

#[tokio::test]
async fn test_budget_smaller_than_every_passage() {
    let long_text = "A very long passage about distributed systems. ".repeat(60);
    let search = Arc::new(ScriptedSearch::new().with(
        Strategy::Hybrid,
        vec![
            passage("big-1", &long_text, 3.0, Strategy::Hybrid),
            passage("big-2", &long_text, 2.0, Strategy::Hybrid),
        ],
    ));
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("unused"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let result = orchestrator
        .answer(Query::new("distributed systems"), &single_pass(Strategy::Hybrid, 5, 200))
        .await;

    match result {
        Err(RagError::ContextExhausted { candidates, .. }) => assert_eq!(candidates, 2),
        other => panic!("expected context exhaustion, got {:?}", other),
    }
    assert_eq!(completion.answer_calls(), 0);
}

#[tokio::test]
async fn test_no_passages_is_context_exhaustion() {
    let search = Arc::new(ScriptedSearch::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("unused"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let result = orchestrator
        .answer(Query::new("anything"), &single_pass(Strategy::Lexical, 5, 500))
        .await;

    assert!(matches!(
        result,
        Err(RagError::ContextExhausted { candidates: 0, .. })
    ));
    assert_eq!(completion.answer_calls(), 0);
}

#[tokio::test]
async fn test_partial_strategy_failure_records_gap() {
    let search = Arc::new(
        ScriptedSearch::new()
            .with(Strategy::Lexical, passages("lex", 3, Strategy::Lexical))
            .failing(Strategy::Vector),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("partial answer"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let options = AnswerOptions {
        strategy: Strategy::Lexical,
        additional_strategies: vec![Strategy::Vector],
        ..Default::default()
    };
    let answer = orchestrator
        .answer(Query::new("query"), &options)
        .await
        .unwrap();

    let gaps: Vec<_> = answer.gaps().collect();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].strategy, Strategy::Vector);
    assert_eq!(answer.metadata.passages_fused, 3);
    assert!(answer
        .context
        .passage_ids()
        .iter()
        .all(|id| id.starts_with("lex-")));
}

#[tokio::test]
async fn test_all_strategies_failing() {
    let search = Arc::new(
        ScriptedSearch::new()
            .failing(Strategy::Lexical)
            .failing(Strategy::Hybrid),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("unused"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let options = AnswerOptions {
        strategy: Strategy::Hybrid,
        additional_strategies: vec![Strategy::Lexical],
        ..Default::default()
    };
    let result = orchestrator.answer(Query::new("query"), &options).await;

    assert!(matches!(result, Err(RagError::Retrieval(_))));
    assert_eq!(completion.answer_calls(), 0);
    // One attempt plus one bounded retry per strategy
    assert_eq!(search.calls().len(), 4);
}

#[tokio::test]
async fn test_embedding_failure_aborts() {
    let search = Arc::new(
        ScriptedSearch::new().with(Strategy::Lexical, passages("lex", 2, Strategy::Lexical)),
    );
    let embedder = Arc::new(DeterministicEmbedder::failing());
    let completion = Arc::new(CountingCompletion::answering("unused"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let options = AnswerOptions {
        strategy: Strategy::Lexical,
        additional_strategies: vec![Strategy::Hybrid],
        ..Default::default()
    };
    let result = orchestrator.answer(Query::new("query"), &options).await;

    assert!(matches!(result, Err(RagError::Embedding(_))));
    assert!(search.calls().is_empty());
    assert_eq!(embedder.calls(), 2);
}

#[tokio::test]
async fn test_generation_failure_is_fatal() {
    let search = Arc::new(
        ScriptedSearch::new().with(Strategy::Lexical, passages("lex", 2, Strategy::Lexical)),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::failing());
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let result = orchestrator
        .answer(Query::new("query"), &single_pass(Strategy::Lexical, 5, 500))
        .await;

    assert!(matches!(result, Err(RagError::Generation(_))));
    assert_eq!(completion.answer_calls(), 2);
}

#[tokio::test]
async fn test_multi_step_converges() {
    let question = "recent advances in retrieval";
    let search = Arc::new(
        ScriptedSearch::new()
            .with_query(question, passages("base", 3, Strategy::Lexical))
            .with_query("dense retrieval models", passages("dense", 3, Strategy::Lexical))
            .with_query("retrieval benchmarks", passages("dense", 3, Strategy::Lexical)),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(
        CountingCompletion::answering("Dense retrieval improved recall.")
            .with_refinements(&["1. dense retrieval models", "\"retrieval benchmarks\""]),
    );
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let options = AnswerOptions {
        strategy: Strategy::Lexical,
        multi_step: true,
        max_steps: 3,
        ..Default::default()
    };
    let answer = orchestrator.answer(Query::new(question), &options).await.unwrap();

    let sub_queries: Vec<&str> = answer.steps.iter().map(|s| s.sub_query.as_str()).collect();
    assert_eq!(sub_queries, vec![question, "dense retrieval models", "retrieval benchmarks"]);
    assert_eq!(answer.steps[1].novelty, 1.0);
    assert_eq!(answer.steps[2].novelty, 0.0);
    assert!(!answer.steps[2].is_novel);
    assert_eq!(answer.metadata.outcome, RetrievalOutcome::Converged);
    assert_eq!(answer.metadata.passages_fused, 6);
    assert_eq!(completion.refinement_calls(), 2);
    assert_eq!(completion.answer_calls(), 1);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_failed_refinement_keeps_first_step() {
    let search = Arc::new(
        ScriptedSearch::new().with(Strategy::Lexical, passages("lex", 3, Strategy::Lexical)),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    // No refinement replies queued, so every refinement call fails
    let completion = Arc::new(CountingCompletion::answering("best effort"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let options = AnswerOptions {
        strategy: Strategy::Lexical,
        multi_step: true,
        max_steps: 3,
        ..Default::default()
    };
    let answer = orchestrator.answer(Query::new("query"), &options).await.unwrap();

    assert_eq!(answer.steps.len(), 1);
    assert_eq!(answer.metadata.outcome, RetrievalOutcome::Exhausted);
    assert_eq!(answer.text, "best effort");
    assert_eq!(search.calls().len(), 1);
}

#[tokio::test]
async fn test_step_cap_with_always_novel_steps() {
    let search = Arc::new(
        ScriptedSearch::new()
            .with_query("query", passages("a", 2, Strategy::Lexical))
            .with_query("second", passages("b", 2, Strategy::Lexical))
            .with_query("third", passages("c", 2, Strategy::Lexical)),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion =
        Arc::new(CountingCompletion::answering("done").with_refinements(&["second", "third"]));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let options = AnswerOptions {
        strategy: Strategy::Lexical,
        multi_step: true,
        max_steps: 2,
        ..Default::default()
    };
    let answer = orchestrator.answer(Query::new("query"), &options).await.unwrap();

    assert_eq!(answer.steps.len(), 2);
    assert!(answer.steps.iter().all(|s| s.is_novel));
    assert_eq!(answer.metadata.outcome, RetrievalOutcome::Exhausted);
    assert_eq!(completion.refinement_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_before_retrieval() {
    let search = Arc::new(
        ScriptedSearch::new().with(Strategy::Lexical, passages("lex", 2, Strategy::Lexical)),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("unused"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = orchestrator
        .answer_with_cancel(Query::new("query"), &single_pass(Strategy::Lexical, 5, 500), &cancel)
        .await;

    assert!(matches!(result, Err(RagError::Cancelled)));
    assert!(search.calls().is_empty());
    assert_eq!(completion.answer_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_during_first_step_of_multi_step() {
    let cancel = CancellationToken::new();
    let search = Arc::new(
        ScriptedSearch::new()
            .with(Strategy::Lexical, passages("lex", 3, Strategy::Lexical))
            .cancelling(cancel.clone()),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("unused").with_refinements(&["next"]));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let options = AnswerOptions {
        strategy: Strategy::Lexical,
        multi_step: true,
        max_steps: 3,
        ..Default::default()
    };
    let result = orchestrator
        .answer_with_cancel(Query::new("query"), &options, &cancel)
        .await;

    // Step 1 was novel, so the loop came back around and stopped before refining
    assert!(matches!(result, Err(RagError::Cancelled)));
    assert_eq!(search.calls().len(), 1);
    assert_eq!(completion.refinement_calls(), 0);
    assert_eq!(completion.answer_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_before_completion_in_single_pass() {
    let cancel = CancellationToken::new();
    let search = Arc::new(
        ScriptedSearch::new()
            .with(Strategy::Lexical, passages("lex", 3, Strategy::Lexical))
            .cancelling(cancel.clone()),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("unused"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let result = orchestrator
        .answer_with_cancel(Query::new("query"), &single_pass(Strategy::Lexical, 5, 500), &cancel)
        .await;

    assert!(matches!(result, Err(RagError::Cancelled)));
    assert_eq!(search.calls().len(), 1);
    assert_eq!(completion.answer_calls(), 0);
}

#[tokio::test]
async fn test_answer_from_provided_text_skips_search() {
    let search = Arc::new(
        ScriptedSearch::new().with(Strategy::Hybrid, passages("idx", 3, Strategy::Hybrid)),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("Supervised learning uses labels."));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let text = "Machine learning learns patterns from data.\n\n\
                Supervised learning trains on labeled examples.\n\n\
                Reinforcement learning learns by trial and error.";
    let provided = paragraphs("notes.txt", text, Strategy::Hybrid);
    let answer = orchestrator
        .answer_with_passages(
            Query::new("What is supervised learning?"),
            provided,
            &AnswerOptions::default(),
        )
        .await
        .unwrap();

    assert!(search.calls().is_empty());
    assert_eq!(embedder.calls(), 0);
    assert_eq!(completion.answer_calls(), 1);
    assert_eq!(completion.refinement_calls(), 0);

    assert_eq!(answer.text, "Supervised learning uses labels.");
    assert_eq!(answer.metadata.outcome, RetrievalOutcome::Provided);
    assert!(answer.steps.is_empty());
    assert_eq!(answer.metadata.passages_retrieved, 3);
    assert_eq!(
        answer.context.passage_ids(),
        vec!["notes.txt#1", "notes.txt#2", "notes.txt#3"]
    );

    let (prompt, _) = completion.last_prompt().unwrap();
    assert!(prompt.contains("Supervised learning trains on labeled examples."));
    assert!(prompt.contains("What is supervised learning?"));
}

#[tokio::test]
async fn test_provided_text_respects_budget() {
    let search = Arc::new(ScriptedSearch::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("unused"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let options = AnswerOptions {
        token_budget: 5,
        ..Default::default()
    };
    let long = "word ".repeat(200);
    let result = orchestrator
        .answer_with_passages(
            Query::new("query"),
            paragraphs("long.txt", &long, Strategy::Lexical),
            &options,
        )
        .await;
    assert!(matches!(
        result,
        Err(RagError::ContextExhausted { candidates: 1, .. })
    ));

    let result = orchestrator
        .answer_with_passages(Query::new("query"), Vec::new(), &AnswerOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(RagError::ContextExhausted { candidates: 0, .. })
    ));
    assert_eq!(completion.answer_calls(), 0);
}

#[tokio::test]
async fn test_query_hint_and_filter_reach_backend() {
    let search = Arc::new(
        ScriptedSearch::new().with(Strategy::Semantic, passages("sem", 2, Strategy::Semantic)),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("ok"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let query = Query::new("query")
        .with_strategy(Strategy::Semantic)
        .with_filter(Some(Filter::new("category eq 'ml'")));
    let answer = orchestrator
        .answer(query, &single_pass(Strategy::Lexical, 3, 500))
        .await
        .unwrap();

    let calls = search.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].strategy, Strategy::Semantic);
    assert_eq!(calls[0].filter.as_deref(), Some("category eq 'ml'"));
    assert_eq!(answer.metadata.strategies, vec![Strategy::Semantic]);
}

#[tokio::test]
async fn test_invalid_options_rejected() {
    let search = Arc::new(ScriptedSearch::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("unused"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let result = orchestrator
        .answer(Query::new("query"), &single_pass(Strategy::Hybrid, 0, 500))
        .await;

    assert!(matches!(result, Err(RagError::InvalidRequest(_))));
    assert!(search.calls().is_empty());
}

#[test]
fn test_configured_defaults_drive_planner() {
    let search = Arc::new(ScriptedSearch::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("unused"));

    let mut config = test_config();
    config.defaults.max_steps = 5;
    config.defaults.novelty_threshold = 0.5;
    let orchestrator = RagOrchestrator::new(
        &config,
        search.clone(),
        embedder.clone(),
        completion.clone(),
    )
    .unwrap();
    let defaults = orchestrator.default_options();
    assert_eq!(defaults.max_steps, 5);
    assert_eq!(defaults.novelty_threshold, 0.5);

    config.defaults.max_steps = 0;
    let result = RagOrchestrator::new(&config, search, embedder, completion);
    assert!(matches!(result, Err(RagError::Configuration(_))));
}

#[tokio::test]
async fn test_system_prompt_override() {
    let search = Arc::new(
        ScriptedSearch::new().with(Strategy::Lexical, passages("lex", 1, Strategy::Lexical)),
    );
    let embedder = Arc::new(DeterministicEmbedder::new());
    let completion = Arc::new(CountingCompletion::answering("ok"));
    let orchestrator = orchestrator(&search, &embedder, &completion);

    let options = AnswerOptions {
        system_prompt: Some("Answer in one sentence.".to_string()),
        ..single_pass(Strategy::Lexical, 5, 500)
    };
    orchestrator.answer(Query::new("query"), &options).await.unwrap();

    let (_, system) = completion.last_prompt().unwrap();
    assert_eq!(system, "Answer in one sentence.");
}
