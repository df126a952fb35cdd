use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use log::info;

mod cli;

use agentlab::backend::{ModelBackend, OllamaBackend};
use agentlab::collect::{BasicCollector, SourceCollector};
use agentlab::config::RunConfig;
use agentlab::domain::Run;
use agentlab::orchestrator::{ApprovalGate, AutoGate, ConsoleGate, Orchestrator, spawn_agents};
use agentlab::sched::PbsScheduler;
use agentlab::store::ArtifactStore;
use cli::Cli;

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentlab")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("agentlab.log");
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn quick_search(config: &RunConfig) -> Result<()> {
    let collector = BasicCollector::new();
    let digest = collector.quick_search(&config.topic).await;

    // Summarize the raw results when the backend is reachable; fall back to
    // printing them as-is when it is not
    let summary = match OllamaBackend::new(config.backend.clone()) {
        Ok(backend) => backend
            .generate(
                &agentlab::prompt::quick_search_summary_prompt(&config.topic, &digest.content),
                "",
                agentlab::backend::GenerateParams::with_temperature(
                    config.backend.temperature.research,
                ),
            )
            .await
            .ok()
            .map(|generation| agentlab::prompt::strip_reasoning(&generation.text)),
        Err(_) => None,
    };

    if let Some(summary) = summary {
        println!("{}\n{}\n", "Answer:".green(), summary);
    }
    println!("{}", digest.content);
    Ok(())
}

async fn run_workflow(cli: &Cli, config: RunConfig) -> Result<()> {
    let run = Run::new(
        config.topic.clone(),
        config.mode,
        config.remote,
        config.attempt_budget,
    );
    let store = Arc::new(
        ArtifactStore::create(&config.workspace_root, &run).context("Failed to create run store")?,
    );
    println!(
        "{} {}",
        "Artifacts:".green(),
        store.root().display()
    );

    let backend: Arc<dyn ModelBackend> = Arc::new(
        OllamaBackend::new(config.backend.clone()).map_err(|e| eyre::eyre!(e.to_string()))?,
    );
    let collector: Arc<dyn SourceCollector> = Arc::new(BasicCollector::new());
    let gate: Arc<dyn ApprovalGate> = if cli.no_gate {
        Arc::new(AutoGate)
    } else {
        Arc::new(ConsoleGate)
    };

    let (cancel_tx, cancel_rx) = agentlab::cancel::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancellation requested, winding down...".yellow());
            let _ = cancel_tx.send(true);
        }
    });

    let (exchange, handles) = spawn_agents(
        &config,
        &run,
        backend.clone(),
        collector,
        Arc::new(PbsScheduler::new()),
        store.clone(),
        cancel_rx.clone(),
    );

    let orchestrator = Orchestrator::new(
        config,
        run,
        handles,
        gate,
        store.clone(),
        backend,
        cancel_rx,
    );

    let outcome = orchestrator.run().await;
    exchange.shutdown().await;

    match outcome {
        Ok(result) => {
            let status_line = format!(
                "{:?} after {} iteration(s), {} attempt(s), {} tokens",
                result.status, result.iterations_completed, result.attempts_used, result.tokens_used
            );
            if result.is_success() {
                println!("{} {}", "Run finished:".green(), status_line);
            } else {
                println!("{} {}", "Run finished:".yellow(), status_line);
            }
            println!("{} {}", "Artifacts:".green(), result.artifact_root.display());
            Ok(())
        }
        Err(err) => {
            println!("{} {}", "Run failed:".red(), err);
            println!("{} {}", "Partial artifacts:".yellow(), store.root().display());
            Err(eyre::eyre!(err.to_string()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = RunConfig::load(cli.config.as_ref())
        .map_err(|e| eyre::eyre!(e.to_string()))
        .context("Failed to load configuration")?;
    let config = cli.apply(config);

    info!("Starting with config from: {:?}", cli.config);

    if cli.verbose {
        println!("{}", "Verbose mode enabled".yellow());
        println!("topic: {}", config.topic);
        println!("mode: {:?}, remote: {}", config.mode, config.remote);
    }

    if cli.quick_search {
        return quick_search(&config).await;
    }

    run_workflow(&cli, config).await.context("Workflow failed")?;
    Ok(())
}
