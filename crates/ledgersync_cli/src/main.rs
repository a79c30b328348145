//! LedgerSync CLI
//!
//! Offline tools for inspecting sync payloads.
//!
//! # Commands
//!
//! - `chunk` - Show how a payload is cut into budget-sized broadcasts
//! - `classify` - Show how raw items are classified for a bulk mutation
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LedgerSync payload tools.
#[derive(Parser)]
#[command(name = "ledgersync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cut a payload into successive budget-respecting chunks
    Chunk {
        /// JSON file: an operation set or an array of raw items
        file: PathBuf,

        /// Size budget per chunk, in kilobytes
        #[arg(short, long, default_value_t = ledgersync_protocol::DEFAULT_SIZE_BUDGET_KB)]
        size_kb: usize,

        /// Item budget per chunk
        #[arg(short, long, default_value_t = ledgersync_protocol::DEFAULT_COUNT_BUDGET)]
        count: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Classify raw items as create, replace or delete
    Classify {
        /// JSON file holding an array of raw items
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging on stderr; stdout carries command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chunk {
            file,
            size_kb,
            count,
            format,
        } => {
            commands::chunk::run(&file, size_kb, count, &format)?;
        }
        Commands::Classify { file, format } => {
            commands::classify::run(&file, &format)?;
        }
        Commands::Version => {
            println!("LedgerSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("LedgerSync Protocol v{}", ledgersync_protocol::VERSION);
        }
    }

    Ok(())
}
