use std::path::PathBuf;

use clap::{Parser, Subcommand};
use code_rag::cancel::CancellationToken;
use code_rag::commands::{forget_file, index_codebase, search_code, show_config, write_config};
use code_rag::config::Config;
use code_rag::{RagError, Result};
use tracing::warn;

#[derive(Parser)]
#[command(name = "code-rag")]
#[command(about = "Index source trees and search them semantically")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the vector store (default: ~/.code-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every source file under a directory
    Index {
        /// Root of the source tree
        #[arg(default_value = ".")]
        root: PathBuf,
    },
    /// Search indexed code with a natural-language query
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long, short, default_value_t = 5)]
        limit: usize,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a file's current chunks from the index
    Forget { file: PathBuf },
    /// Write the default configuration, or show the current one
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::default_dir().map_err(|e| RagError::Config(e.to_string()))?,
    };
    let config = Config::load(&config_dir)?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Index { root } => {
            index_codebase(&config, &root, &token).await?;
        }
        Commands::Search { query, limit, json } => {
            search_code(&config, &query, limit, json, &token).await?;
        }
        Commands::Forget { file } => {
            forget_file(&config, &file, &token).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                write_config(&config)?;
            }
        }
    }

    Ok(())
}
