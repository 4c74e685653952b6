//! healthrag - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{IsTerminal, Read};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use healthrag::{
    answer::{format_sources, AnswerComposer},
    cli::{Args, Commands, Config, Verbosity},
    doctor::Doctor,
    llm::OllamaClient,
    question::require_question,
    rag::{RAGPipeline, Retriever, UnavailableRetriever},
    store::QdrantRetriever,
    RagError,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(msg) = args.validate() {
        eprintln!("{} {}", "ERROR:".red().bold(), msg);
        std::process::exit(2);
    }

    init_tracing(args.verbosity());

    let mut config = Config::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate()?;

    match &args.command {
        Some(Commands::Doctor) => run_doctor(&config).await,
        Some(Commands::Config) => show_config(&config),
        None => {
            let input = match &args.question {
                Some(question) => question.clone(),
                None => read_stdin()?,
            };

            let question = match require_question(&input) {
                Ok(question) => question,
                Err(RagError::InvalidInput(_)) => {
                    eprintln!("ERROR: No question provided");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            };

            answer_question(&args, &config, &question).await
        }
    }
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Piped input; an interactive terminal yields nothing
fn read_stdin() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(String::new());
    }

    let mut input = String::new();
    stdin
        .read_to_string(&mut input)
        .context("Failed to read question from stdin")?;
    Ok(input)
}

fn spinner(verbosity: Verbosity) -> ProgressBar {
    if !verbosity.show_progress() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn answer_question(args: &Args, config: &Config, question: &str) -> Result<()> {
    let verbosity = args.verbosity();

    let generator = Arc::new(OllamaClient::with_config(
        &config.ollama_url(),
        &config.ollama.model,
        config.request_timeout(),
    )?);

    // Unreachable collaborators degrade answers to the canned reply
    match generator.health_check().await {
        Ok(true) => {}
        Ok(false) => warn!(
            url = generator.base_url(),
            "Ollama is not running; start it with `ollama serve`"
        ),
        Err(e) => warn!(url = generator.base_url(), error = %e, "Ollama health check failed"),
    }

    let pb = spinner(verbosity);
    pb.set_message(format!("Loading embedding model {}", config.store.embedding_model));
    let retriever = open_retriever(config).await;
    pb.finish_and_clear();

    let pipeline = RAGPipeline::with_config(retriever, generator.clone(), config.retrieval.clone());
    let composer = AnswerComposer::new(config.request_timeout());

    for strategy in args.mode.strategies() {
        let pb = spinner(verbosity);
        pb.set_message(format!("{}: retrieving sources", strategy));
        let result = pipeline.execute(question, strategy).await?;

        pb.set_message(format!("{}: writing answer", strategy));
        let answer = composer.compose(pipeline.generator().as_ref(), &result).await;
        pb.finish_and_clear();

        println!("\n{}\n", format!("=== {} ===", strategy).bold());
        println!("{}\n", answer);
        println!("{}", format_sources(&result.sources()));

        if args.trace || verbosity.show_trace() {
            eprintln!("\n{}", result.trace.render());
        }
    }

    Ok(())
}

async fn open_retriever(config: &Config) -> Arc<dyn Retriever> {
    let store_config = config.store.clone();
    let loaded = tokio::task::spawn_blocking(move || QdrantRetriever::new(&store_config)).await;

    match loaded {
        Ok(Ok(retriever)) => Arc::new(retriever),
        Ok(Err(e)) => {
            warn!(error = %e, "knowledge base unavailable, answers will not be grounded");
            Arc::new(UnavailableRetriever::new(e.to_string()))
        }
        Err(e) => {
            warn!(error = %e, "embedding model loader panicked");
            Arc::new(UnavailableRetriever::new(e.to_string()))
        }
    }
}

async fn run_doctor(config: &Config) -> Result<()> {
    let ollama = OllamaClient::with_config(
        &config.ollama_url(),
        &config.ollama.model,
        Duration::from_secs(5),
    )?;
    let doctor = Doctor::new(ollama, config.store.clone());

    let checks = doctor.run_diagnostics().await;
    Doctor::display_results(&checks);

    std::process::exit(if Doctor::overall_status(&checks) { 0 } else { 1 });
}

fn show_config(config: &Config) -> Result<()> {
    if let Some(path) = Config::default_path() {
        println!("# default location: {}", path.display());
    }
    println!("{}", config.to_toml()?);
    Ok(())
}
