//! Command-line argument parsing for ragpilot
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::rag::AnswerOptions;
use crate::types::{Filter, Query, Strategy};

/// ragpilot - answer questions from an indexed corpus
#[derive(Parser, Debug)]
#[command(name = "ragpilot")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(
    about = "Multi-strategy retrieval-augmented answering over Azure AI Search",
    long_about = None
)]
pub struct Args {
    /// Question to answer
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Retrieval strategy: lexical, vector, hybrid or semantic
    #[arg(short, long)]
    pub strategy: Option<Strategy>,

    /// Extra strategies fused with the primary one (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub also: Vec<Strategy>,

    /// Enable multi-step retrieval
    #[arg(long)]
    pub multi_step: bool,

    /// Maximum retrieval steps in multi-step mode
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Minimum share of new passages for a step to count as novel
    #[arg(long)]
    pub novelty_threshold: Option<f64>,

    /// Context budget in tokens
    #[arg(short = 'b', long)]
    pub token_budget: Option<usize>,

    /// Results per strategy call
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Sampling temperature for generation
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Override the system prompt
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Backend filter expression (OData)
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Answer from this text file instead of searching the index
    #[arg(long, value_name = "PATH")]
    pub context_file: Option<PathBuf>,

    /// Print the answer as JSON
    #[arg(long)]
    pub json: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except final result)
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every strategy for a query and show the lists next to the fused ranking
    Compare {
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Display current configuration
    Config {
        /// Write a default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Check that a query or a subcommand was given, but not both
    pub fn validate(&self) -> Result<(), String> {
        if self.command.is_none() && self.query.is_none() {
            return Err("Query required. Use 'ragpilot <QUERY>' or run a subcommand.".to_string());
        }

        if self.command.is_some() && self.query.is_some() {
            return Err("Cannot specify a query with a subcommand.".to_string());
        }

        if self.command.is_some() && self.context_file.is_some() {
            return Err("--context-file only applies to a plain query.".to_string());
        }

        Ok(())
    }

    /// Overlay command-line flags on configured defaults
    pub fn answer_options(&self, defaults: AnswerOptions) -> AnswerOptions {
        let mut options = defaults;

        if let Some(strategy) = self.strategy {
            options.strategy = strategy;
        }
        if !self.also.is_empty() {
            options.additional_strategies = self.also.clone();
        }
        options.multi_step |= self.multi_step;
        if let Some(max_steps) = self.max_steps {
            options.max_steps = max_steps;
        }
        if let Some(threshold) = self.novelty_threshold {
            options.novelty_threshold = threshold;
        }
        if let Some(budget) = self.token_budget {
            options.token_budget = budget;
        }
        if let Some(top_k) = self.top_k {
            options.top_k = top_k;
        }
        if let Some(temperature) = self.temperature {
            options.temperature = temperature;
        }
        if let Some(prompt) = &self.system_prompt {
            options.system_prompt = Some(prompt.clone());
        }
        if let Some(filter) = &self.filter {
            options.filter = Some(Filter::new(filter.clone()));
        }

        options
    }

    /// Build the query value for a question
    pub fn build_query(&self, text: &str) -> Query {
        let query = Query::new(text.trim());
        match self.strategy {
            Some(strategy) => query.with_strategy(strategy),
            None => query,
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Check if should show progress spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show retrieval steps and metadata
    pub fn show_details(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show per-step passage lists
    pub fn show_steps(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }

    /// Default log directive when `RAGPILOT_LOG` is unset
    pub fn log_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "ragpilot=info,warn",
            Verbosity::VeryVerbose => "ragpilot=debug,info",
        }
    }
}
