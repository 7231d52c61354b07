//! Genloom CLI - streaming record recovery from a generative provider
//!
//! Usage:
//!   genloom serve                     Run the HTTP/SSE server
//!   genloom ask <brief>               One-shot generation, print records
//!   genloom stream <brief>            Stream generation, print SSE frames

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use genloom_core::{JsonDirStore, LoomConfig, RecordShape, RecordStore, RelayProfile};
use genloom_ingest::UpstreamClient;

mod prompts;

#[derive(Parser)]
#[command(name = "genloom")]
#[command(author, version, about = "Streaming record recovery pipeline")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Persist recovered record batches into this directory
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/SSE server
    Serve {
        /// Listen address
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        addr: String,
    },

    /// One-shot generation: run to completion and print the records
    Ask {
        /// Project brief (one-line description of what to build)
        brief: String,

        #[command(flatten)]
        job: JobArgs,
    },

    /// Streaming generation: print each event as an SSE frame on stdout
    Stream {
        /// Project brief (one-line description of what to build)
        brief: String,

        #[command(flatten)]
        job: JobArgs,
    },
}

#[derive(clap::Args)]
struct JobArgs {
    /// Which record shape to generate
    #[arg(short, long, value_enum, default_value = "questions")]
    shape: CliShape,

    /// Project name used in the prompt
    #[arg(long, default_value = "my-app")]
    name: String,

    /// Technology stack used in the prompt
    #[arg(long, default_value = "MERN")]
    stack: String,

    /// JSON file with user preference answers (files shape only)
    #[arg(long)]
    answers: Option<PathBuf>,

    /// JSON file with the UI theme (files shape only)
    #[arg(long)]
    theme: Option<PathBuf>,

    /// Send the brief verbatim instead of wrapping it in a canned prompt
    #[arg(long)]
    raw: bool,
}

/// CLI-friendly shape selector
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliShape {
    Questions,
    Files,
}

impl CliShape {
    fn record_shape(self) -> RecordShape {
        match self {
            CliShape::Questions => RecordShape::questions(),
            CliShape::Files => RecordShape::project_files(),
        }
    }

    fn temperature(self, config: &LoomConfig) -> f64 {
        match self {
            CliShape::Questions => config.upstream.question_temperature,
            CliShape::Files => config.upstream.file_temperature,
        }
    }

    fn relay_profile(self, config: &LoomConfig) -> RelayProfile {
        match self {
            CliShape::Questions => config.conversational_relay.clone(),
            CliShape::Files => config.bulk_relay.clone(),
        }
    }
}

impl JobArgs {
    /// Resolve the outbound prompt from the brief and shape
    fn build_prompt(&self, brief: &str) -> Result<String> {
        if self.raw {
            return Ok(brief.to_string());
        }
        match self.shape {
            CliShape::Questions => Ok(prompts::questions_prompt(&self.name, brief, &self.stack)),
            CliShape::Files => {
                let answers = read_json_or_default(self.answers.as_deref())?;
                let theme = read_json_or_default(self.theme.as_deref())?;
                Ok(prompts::files_prompt(
                    &self.name, brief, &self.stack, &answers, &theme,
                ))
            }
        }
    }
}

fn read_json_or_default(path: Option<&std::path::Path>) -> Result<String> {
    match path {
        Some(p) => {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
            // Validate early; a bad file here would otherwise poison the prompt
            serde_json::from_str::<serde_json::Value>(&content)
                .with_context(|| format!("{} is not valid JSON", p.display()))?;
            Ok(content)
        }
        None => Ok("{}".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = LoomConfig::load_or_default(cli.config.as_deref())?;
    let store: Option<Arc<dyn RecordStore>> = cli
        .store_dir
        .map(|dir| Arc::new(JsonDirStore::new(dir)) as Arc<dyn RecordStore>);

    match cli.command {
        Commands::Serve { addr } => genloom_relay::serve(config, &addr, store).await,
        Commands::Ask { brief, job } => cmd_ask(config, store, brief, job).await,
        Commands::Stream { brief, job } => cmd_stream(config, store, brief, job).await,
    }
}

async fn cmd_ask(
    config: LoomConfig,
    store: Option<Arc<dyn RecordStore>>,
    brief: String,
    job: JobArgs,
) -> Result<()> {
    let client = UpstreamClient::from_env(config.upstream.clone())?;
    let shape = job.shape.record_shape();
    let prompt = job.build_prompt(&brief)?;
    let temperature = job.shape.temperature(&config);

    let records =
        genloom_relay::run_blocking(&client, &config, &shape, &prompt, temperature, store).await?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn cmd_stream(
    config: LoomConfig,
    store: Option<Arc<dyn RecordStore>>,
    brief: String,
    job: JobArgs,
) -> Result<()> {
    let client = UpstreamClient::from_env(config.upstream.clone())?;
    let shape = job.shape.record_shape();
    let prompt = job.build_prompt(&brief)?;
    let temperature = job.shape.temperature(&config);
    let profile = job.shape.relay_profile(&config);

    let (tx, mut rx) = mpsc::channel::<genloom_core::StreamEvent>(64);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print!("{}", event.to_sse_frame());
        }
    });

    let result = genloom_relay::run_streaming(
        &client,
        &config,
        &shape,
        profile,
        &prompt,
        temperature,
        tx,
        store,
    )
    .await;

    printer.await?;

    // The failure was already printed as an error frame; exit non-zero
    result.map(|_| ()).map_err(Into::into)
}
