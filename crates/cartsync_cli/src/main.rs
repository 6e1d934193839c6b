//! cartsync CLI
//!
//! Command-line tools for running and debugging cart sync.
//!
//! # Commands
//!
//! - `serve` - Run the broadcast coordinator
//! - `inspect` - Display a persisted cart blob

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// cartsync command-line tools.
#[derive(Parser)]
#[command(name = "cartsync")]
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
    /// Run the broadcast coordinator until Ctrl-C
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:9470")]
        bind: SocketAddr,

        /// Per-connection delivery queue size
        #[arg(long, default_value = "256")]
        delivery_capacity: usize,

        /// Maximum connections per cart channel
        #[arg(long, default_value = "64")]
        max_members: usize,
    },

    /// Display a persisted cart blob
    Inspect {
        /// Directory holding the blob store
        #[arg(short, long)]
        path: PathBuf,

        /// Blob key
        #[arg(short, long, default_value = cartsync_engine::DEFAULT_BLOB_KEY)]
        key: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            delivery_capacity,
            max_members,
        } => {
            commands::serve::run(bind, delivery_capacity, max_members)?;
        }
        Commands::Inspect { path, key, format } => {
            commands::inspect::run(&path, &key, &format)?;
        }
        Commands::Version => {
            println!("cartsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("cartsync engine v{}", cartsync_engine::VERSION);
        }
    }

    Ok(())
}
