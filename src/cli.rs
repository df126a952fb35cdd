//! Command-line interface
//!
//! Parses the operator-facing flags and folds them over the file-loaded
//! configuration. The core never sees the CLI; it receives the finished
//! [`RunConfig`].

use clap::Parser;
use std::path::PathBuf;

use agentlab::config::RunConfig;
use agentlab::domain::{RunMode, SourceInput};

#[derive(Parser, Debug)]
#[command(
    name = "agentlab",
    about = "Iterative multi-agent research and code workflow",
    version
)]
pub struct Cli {
    /// Research topic to investigate
    #[arg(long)]
    pub topic: Option<String>,

    /// Which halves of the workflow to run
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// PDF files to include as sources
    #[arg(long, num_args = 1..)]
    pub pdfs: Vec<PathBuf>,

    /// URLs to include as sources
    #[arg(long, num_args = 1..)]
    pub links: Vec<String>,

    /// Directory whose file inventory is summarized for the agents
    #[arg(long)]
    pub files_dir: Option<PathBuf>,

    /// Submit execution to the batch cluster instead of running locally
    #[arg(long)]
    pub remote: bool,

    /// Total execution attempts across the run
    #[arg(long)]
    pub attempt_budget: Option<u32>,

    /// Interpreter environment root (e.g. a conda env path)
    #[arg(long)]
    pub environment: Option<PathBuf>,

    /// Configuration file path (default: .agentlab.yml if present)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Answer the topic with one web search pass instead of the full loop
    #[arg(long)]
    pub quick_search: bool,

    /// Approve every gate automatically (unattended runs)
    #[arg(long)]
    pub no_gate: bool,

    /// Verbose console output
    #[arg(long, short)]
    pub verbose: bool,
}

/// CLI face of [`RunMode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    ResearchOnly,
    CodeOnly,
    Both,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::ResearchOnly => RunMode::ResearchOnly,
            ModeArg::CodeOnly => RunMode::CodeOnly,
            ModeArg::Both => RunMode::Both,
        }
    }
}

impl Cli {
    /// Overlay CLI flags onto a file-loaded configuration
    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(topic) = &self.topic {
            config.topic = topic.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if self.remote {
            config.remote = true;
        }
        if let Some(budget) = self.attempt_budget {
            config.attempt_budget = budget;
        }
        if let Some(environment) = &self.environment {
            config.environment = Some(environment.clone());
        }

        for pdf in &self.pdfs {
            config.sources.push(SourceInput::Pdf { path: pdf.clone() });
        }
        for link in &self.links {
            config.sources.push(SourceInput::Url { url: link.clone() });
        }
        if let Some(dir) = &self.files_dir {
            config.sources.push(SourceInput::Directory { path: dir.clone() });
        }
        config
    }
}
