//! ragpilot - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ragpilot::{
    cli::{Args, Commands},
    display::DisplayManager,
    providers::{AzureSearchBackend, OpenAiClient},
    types::paragraphs,
    RagConfig, RagOrchestrator,
};

/// Environment variable holding a tracing filter directive
const LOG_ENV: &str = "RAGPILOT_LOG";

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in a local .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();
    if let Err(e) = args.validate() {
        eprintln!("{}", e);
        std::process::exit(2);
    }

    init_tracing(&args);

    match &args.command {
        Some(Commands::Config { init }) => show_config(&args, *init),
        Some(Commands::Compare { query }) => run_compare(&args, query).await,
        None => {
            let query = args.query.clone().unwrap_or_default();
            run_query(&args, &query).await
        }
    }
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(args.verbosity().log_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> Result<RagConfig> {
    let config = RagConfig::load(args.config.as_deref())?;
    config.validate()?;
    Ok(config)
}

fn build_orchestrator(config: &RagConfig) -> Result<RagOrchestrator> {
    let search = Arc::new(AzureSearchBackend::new(&config.search)?);
    let llm = Arc::new(OpenAiClient::new(&config.llm)?);
    tracing::info!(
        index = %config.search.index_name,
        azure_openai = llm.is_azure(),
        "providers initialised"
    );

    Ok(RagOrchestrator::new(config, search, llm.clone(), llm)?)
}

/// Cancel the token on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling after the current step");
            watcher.cancel();
        }
    });
    cancel
}

async fn run_query(args: &Args, text: &str) -> Result<()> {
    let display = DisplayManager::new(args.verbosity());
    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            display.show_error(&format!("{:#}", e));
            std::process::exit(2);
        }
    };

    let orchestrator = build_orchestrator(&config)?;
    let options = args.answer_options(orchestrator.default_options());
    let query = args.build_query(text);
    let cancel = cancel_on_ctrl_c();

    let result = match &args.context_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read context file: {}", path.display()))?;
            let document_id = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let passages = paragraphs(&document_id, &text, options.strategy);
            display.show_info(&format!(
                "using {} paragraph(s) from {} as context",
                passages.len(),
                path.display()
            ));

            let spinner = display.start_spinner("Generating...");
            let result = orchestrator
                .answer_with_passages(query, passages, &options)
                .await;
            spinner.finish_and_clear();
            result
        }
        None => {
            let spinner = display.start_spinner("Retrieving and generating...");
            let result = orchestrator
                .answer_with_cancel(query, &options, &cancel)
                .await;
            spinner.finish_and_clear();
            result
        }
    };

    match result {
        Ok(answer) if args.json => {
            println!("{}", serde_json::to_string_pretty(&answer)?);
            Ok(())
        }
        Ok(answer) => {
            display.show_answer(&answer);
            Ok(())
        }
        Err(e) => {
            display.show_error(&e.to_string());
            std::process::exit(1);
        }
    }
}

async fn run_compare(args: &Args, text: &str) -> Result<()> {
    let display = DisplayManager::new(args.verbosity());
    let config = load_config(args)?;
    let orchestrator = build_orchestrator(&config)?;

    let mut options = args.answer_options(orchestrator.default_options());
    options.multi_step = false;
    options.additional_strategies = ragpilot::Strategy::ALL.to_vec();
    let query = args.build_query(text);

    let spinner = display.start_spinner("Running every strategy...");
    let result = orchestrator.retrieve(&query, &options).await;
    spinner.finish_and_clear();

    match result {
        Ok(retrieval) => {
            display.show_comparison(&retrieval, options.top_k);
            Ok(())
        }
        Err(e) => {
            display.show_error(&e.to_string());
            std::process::exit(1);
        }
    }
}

fn show_config(args: &Args, init: bool) -> Result<()> {
    let display = DisplayManager::new(args.verbosity());
    let path = match &args.config {
        Some(path) => path.clone(),
        None => RagConfig::config_path()?,
    };

    if init {
        if path.exists() {
            display.show_info(&format!("{} already exists, leaving it untouched", path.display()));
        } else {
            let written = RagConfig::default().save(Some(&path))?;
            display.show_info(&format!("wrote default configuration to {}", written.display()));
        }
    }

    let config = RagConfig::load(Some(&path))?;
    display.show_config(&config, &path);

    if let Err(e) = config.validate() {
        display.show_warning(&e.to_string());
    }
    Ok(())
}
