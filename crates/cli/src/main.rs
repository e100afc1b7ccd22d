//! Eyebreak CLI
//!
//! Starts and inspects break sessions on a running agent, and runs the
//! classifier offline for debugging models and label files.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{breaks, debug};
use eyebreak_core::session::{DEFAULT_CLOSED_EYE_ALIASES, DEFAULT_CONFIDENCE_THRESHOLD};
use std::path::PathBuf;

/// Eyebreak CLI
#[derive(Parser)]
#[command(name = "eyebreak")]
#[command(author, version, about = "CLI for the eyebreak verification agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via EYEBREAK_API_URL or the config file)
    #[arg(long, env = "EYEBREAK_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a break session
    Start {
        /// Break length in seconds (agent default if omitted)
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Show the running break session
    Status,

    /// Cancel the running break session
    Cancel,

    /// Show the last completed break
    Last,

    /// Offline debugging commands
    #[command(subcommand)]
    Debug(DebugCommands),
}

#[derive(Subcommand)]
pub enum DebugCommands {
    /// Parse a label file and list its labels
    Labels {
        /// Label file path
        path: PathBuf,

        /// Label aliases counted as eyes closed
        #[arg(long, value_delimiter = ',', default_values_t = default_aliases())]
        accepted_labels: Vec<String>,
    },

    /// Classify a single image with a local model
    Classify {
        /// Image file to classify
        image: PathBuf,

        /// ONNX model path
        #[arg(long)]
        model: PathBuf,

        /// Label file path
        #[arg(long)]
        labels: PathBuf,

        /// Square model input side in pixels
        #[arg(long, default_value_t = 224)]
        input_side: u32,

        /// Model input channels (1 or 3)
        #[arg(long, default_value_t = 3)]
        channels: u32,

        /// Minimum confidence to accept
        #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
        threshold: f32,

        /// Label aliases counted as eyes closed
        #[arg(long, value_delimiter = ',', default_values_t = default_aliases())]
        accepted_labels: Vec<String>,

        /// Expected SHA256 of the model file
        #[arg(long)]
        sha256: Option<String>,
    },
}

fn default_aliases() -> Vec<String> {
    DEFAULT_CLOSED_EYE_ALIASES
        .iter()
        .map(|alias| alias.to_string())
        .collect()
}

/// Build an API client from the flag, the config file or the default URL
fn connect(api_url: Option<String>) -> Result<client::ApiClient> {
    let settings = config::Config::load()?;
    client::ApiClient::new(&settings.resolve_api_url(api_url))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Debug(debug_cmd) => match debug_cmd {
            DebugCommands::Labels {
                path,
                accepted_labels,
            } => debug::labels(&path, &accepted_labels, cli.format)?,
            DebugCommands::Classify {
                image,
                model,
                labels,
                input_side,
                channels,
                threshold,
                accepted_labels,
                sha256,
            } => {
                let options = debug::ClassifyOptions {
                    model,
                    labels,
                    image,
                    input_side,
                    channels,
                    threshold,
                    accepted_labels,
                    model_sha256: sha256,
                };
                let format = cli.format;
                tokio::task::spawn_blocking(move || debug::classify(options, format)).await??;
            }
        },
        Commands::Start { duration } => {
            breaks::start(&connect(cli.api_url)?, duration, cli.format).await?
        }
        Commands::Status => breaks::status(&connect(cli.api_url)?, cli.format).await?,
        Commands::Cancel => breaks::cancel(&connect(cli.api_url)?, cli.format).await?,
        Commands::Last => breaks::last(&connect(cli.api_url)?, cli.format).await?,
    }

    Ok(())
}
