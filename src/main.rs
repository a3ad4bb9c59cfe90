use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pairline::config::{Config, LogConfig, CONFIG_PATH_ENV};
use transcript::ConversationState;

#[derive(Parser, Debug)]
#[command(name = "pairline")]
#[command(about = "Agent session host speaking line-delimited JSON on stdio")]
#[command(version)]
struct Cli {
    /// JSON config file
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the bridge on stdin/stdout (default)
    Serve,
    /// Run one turn in-process and print the resulting snapshot
    Compose {
        /// Existing or new thread id; a fresh one is generated when omitted
        #[arg(long)]
        thread: Option<String>,
        /// Context file to attach (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
        /// Image as a base64 data URL
        #[arg(long)]
        image: Option<String>,
        text: String,
    },
    /// Print the snapshot of a stored thread
    Show { thread: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    pairline::logging::init(&LogConfig::from_env())?;
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => pairline::serve_stdio(&config).await,
        Commands::Compose {
            thread,
            files,
            image,
            text,
        } => {
            let (client, mut notifications) = pairline::connect_in_process(&config)?;
            tokio::spawn(async move {
                while let Some(notification) = notifications.recv().await {
                    tracing::info!(
                        thread_id = %notification.thread_id,
                        seq = notification.seq,
                        phase = ?notification.phase,
                        "compose phase"
                    );
                }
            });
            let state = client.compose(thread, text, files, image).await?;
            print_snapshot(&state)
        }
        Commands::Show { thread } => {
            let (client, _notifications) = pairline::connect_in_process(&config)?;
            let state = client.get_thread(thread).await?;
            print_snapshot(&state)
        }
    }
}

fn print_snapshot(state: &ConversationState) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(state)?;
    println!("{rendered}");
    Ok(())
}
