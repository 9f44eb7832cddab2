use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::prelude::*;

mod chat;
mod config;
mod editor;
mod input;

use crate::config::{FileConfig, PairpadDirs, load_config};
use crate::editor::EditorBuffer;

#[derive(Parser)]
#[command(name = "pairpad")]
#[command(about = "Edit a file together with a remote AI assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.pairpad)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Assistant service host (overrides config)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Assistant service port (overrides config)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant about a file (default)
    Chat(ChatArgs),

    /// Print the resolved configuration
    Config,
}

#[derive(Parser, Default)]
struct ChatArgs {
    /// File to seed the editor buffer with (read only, never written; /reload re-reads it)
    file: Option<PathBuf>,

    /// Path reported to the assistant (defaults to FILE, or main.py)
    #[arg(long)]
    file_path: Option<String>,
}

fn init_logging(debug: bool) {
    let default_directive = if debug {
        "pairpad=debug,pairpad_session=debug,info"
    } else {
        "pairpad=info,pairpad_session=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn resolve_config(cli: &Cli, dirs: &PairpadDirs) -> Result<FileConfig> {
    let mut fc: FileConfig = load_config(&dirs.data_dir)
        .extract()
        .with_context(|| format!("Invalid configuration in {}", dirs.config_path().display()))?;
    if let Some(host) = &cli.host {
        fc.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        fc.server.port = port;
    }
    Ok(fc)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let dirs = PairpadDirs::new(cli.data_dir.clone())?;
    let fc = resolve_config(&cli, &dirs)?;

    match cli.command {
        Some(Commands::Config) => {
            let rendered = toml::to_string_pretty(&fc).context("Failed to render config")?;
            print!("{rendered}");
            Ok(())
        }
        Some(Commands::Chat(args)) => run_chat(args, &fc).await,
        None => run_chat(ChatArgs::default(), &fc).await,
    }
}

async fn run_chat(args: ChatArgs, fc: &FileConfig) -> Result<()> {
    let buffer = match &args.file {
        Some(file) => EditorBuffer::load(file, args.file_path)?,
        None => {
            let mut buffer = EditorBuffer::default();
            if let Some(path) = args.file_path {
                buffer.path = path;
            }
            buffer
        }
    };
    info!(path = %buffer.path, bytes = buffer.content.len(), "editor buffer ready");
    chat::run_chat(fc.manager_config(), buffer).await
}
