//! Terminal output for answers, comparisons and configuration

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::cli::Verbosity;
use crate::config::RagConfig;
use crate::rag::Retrieval;
use crate::types::{Answer, Passage, RankedPassage, RetrievalOutcome};

const RULE_WIDTH: usize = 60;
const PREVIEW_CHARS: usize = 100;

/// Display manager for CLI output
pub struct DisplayManager {
    verbosity: Verbosity,
}

impl DisplayManager {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Spinner shown while a request runs; hidden in quiet mode
    pub fn start_spinner(&self, message: &str) -> ProgressBar {
        if !self.verbosity.show_progress() {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Metadata, sources, then the answer text
    pub fn show_answer(&self, answer: &Answer) {
        if self.verbosity.show_details() {
            self.show_section("METADATA");
            let meta = &answer.metadata;
            let strategies: Vec<&str> = meta.strategies.iter().map(|s| s.as_str()).collect();

            println!("Request: {}", meta.request_id.to_string().dimmed());
            if meta.outcome == RetrievalOutcome::Provided {
                println!("Search Type: none (provided context)");
            } else {
                println!("Search Type: {}", strategies.join(" + "));
                println!("Retrieval: {:?} after {} step(s)", meta.outcome, answer.steps.len());
            }
            println!(
                "Passages: {} retrieved, {} fused, {} packed",
                meta.passages_retrieved, meta.passages_fused, meta.passages_packed
            );
            println!(
                "Context Tokens: {} / {}",
                answer.context.total_tokens(),
                answer.context.budget().available()
            );

            let scores: Vec<f64> = answer.context.entries().iter().map(|e| e.fused_score).collect();
            if let Some((min, max, mean)) = score_summary(&scores) {
                println!("Average Relevance Score: {:.4}", mean);
                println!("Score Range: {:.4} - {:.4}", min, max);
            }
            println!("Retrieval Time: {}", format_duration(meta.retrieval_time));
            println!("Generation Time: {}", format_duration(meta.generation_time));

            for gap in answer.gaps() {
                self.show_warning(&format!("{} strategy failed: {}", gap.strategy, gap.error));
            }

            if self.verbosity.show_steps() {
                for step in &answer.steps {
                    println!(
                        "\n  {} {} {}",
                        format!("Step {}:", step.index).cyan(),
                        step.sub_query,
                        format!(
                            "({} passages, novelty {:.0}%)",
                            step.passages.len(),
                            step.novelty * 100.0
                        )
                        .dimmed()
                    );
                }
            }

            println!("\nSources:");
            println!("{}", "-".repeat(RULE_WIDTH));
            for (i, entry) in answer.context.entries().iter().enumerate() {
                println!(
                    "  {}. {} {}",
                    (i + 1).to_string().cyan(),
                    entry.attribution,
                    format!("(score {:.4})", entry.fused_score).dimmed()
                );
            }
        }

        self.show_section("ANSWER");
        println!("{}", answer.text);
        println!("{}\n", "=".repeat(RULE_WIDTH));
    }

    /// Each strategy list followed by the fused ranking
    pub fn show_comparison(&self, retrieval: &Retrieval, limit: usize) {
        for list in &retrieval.lists {
            self.show_section(&format!(
                "{} ({} results)",
                list.strategy.as_str().to_uppercase(),
                list.passages.len()
            ));
            for (i, passage) in list.passages.iter().take(limit).enumerate() {
                println!("  {}", format_passage(i + 1, passage));
            }
        }

        for step in &retrieval.steps {
            for gap in &step.gaps {
                self.show_warning(&format!("{} strategy failed: {}", gap.strategy, gap.error));
            }
        }

        self.show_section(&format!("FUSED ({} passages)", retrieval.fused.len()));
        for ranked in retrieval.fused.iter().take(limit) {
            println!("  {}", format_ranked(ranked));
        }
        println!();
    }

    /// Configuration with secrets redacted
    pub fn show_config(&self, config: &RagConfig, path: &std::path::Path) {
        self.show_section("CONFIGURATION");
        println!("File: {}", path.display().to_string().dimmed());
        println!();
        println!("Search endpoint:  {}", config.search.endpoint.as_deref().unwrap_or("(not set)"));
        println!("Search key:       {}", redact(config.search.api_key.as_deref()));
        println!("Index:            {}", config.search.index_name);
        if config.llm.uses_azure_openai() {
            println!("LLM provider:     Azure OpenAI");
            println!("LLM endpoint:     {}", config.llm.azure_endpoint.as_deref().unwrap_or(""));
            println!("LLM key:          {}", redact(config.llm.azure_api_key.as_deref()));
            println!("Deployment:       {}", config.llm.azure_deployment.as_deref().unwrap_or(""));
        } else {
            println!("LLM provider:     OpenAI");
            println!("LLM key:          {}", redact(config.llm.openai_api_key.as_deref()));
            println!("Model:            {}", config.llm.openai_model);
        }
        println!();

        match toml::to_string_pretty(config) {
            Ok(rendered) => println!("{}", rendered.dimmed()),
            Err(e) => self.show_error(&format!("cannot render configuration: {}", e)),
        }
    }

    /// Display error message
    pub fn show_error(&self, error: &str) {
        eprintln!("{} {}", "Error:".red().bold(), error.red());
    }

    /// Display warning message
    pub fn show_warning(&self, warning: &str) {
        if self.verbosity.show_details() {
            println!("{} {}", "Warning:".yellow().bold(), warning.yellow());
        }
    }

    /// Display info message
    pub fn show_info(&self, info: &str) {
        if self.verbosity.show_details() {
            println!("{} {}", "Info:".cyan(), info);
        }
    }

    /// Show section header
    pub fn show_section(&self, title: &str) {
        println!("\n{}", "=".repeat(RULE_WIDTH));
        println!("{}", title.bold().cyan());
        println!("{}", "=".repeat(RULE_WIDTH));
    }
}

/// `(min, max, mean)` of a non-empty score list
pub fn score_summary(scores: &[f64]) -> Option<(f64, f64, f64)> {
    if scores.is_empty() {
        return None;
    }
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    Some((min, max, mean))
}

/// First `max_chars` characters, with an ellipsis when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

fn format_passage(position: usize, passage: &Passage) -> String {
    format!(
        "{}. {} {} {}",
        position,
        passage.source.attribution(),
        format!("(raw {:.4})", passage.score).dimmed(),
        preview(&passage.text, PREVIEW_CHARS)
    )
}

fn format_ranked(ranked: &RankedPassage) -> String {
    let provenance: Vec<&str> = ranked.provenance.iter().map(|s| s.as_str()).collect();
    format!(
        "{}. {} {} [{}] {}",
        ranked.rank,
        ranked.passage.source.attribution(),
        format!("(fused {:.4})", ranked.fused_score).green(),
        provenance.join(", "),
        preview(&ranked.passage.text, PREVIEW_CHARS)
    )
}

fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms > 1000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", ms)
    }
}

fn redact(secret: Option<&str>) -> String {
    match secret {
        Some(s) if s.chars().count() > 8 => {
            let tail: String = s.chars().skip(s.chars().count() - 4).collect();
            format!("****{}", tail)
        }
        Some(_) => "****".to_string(),
        None => "(not set)".to_string(),
    }
}
