//! textsync CLI
//!
//! Command-line client for collaborative text sessions.
//!
//! # Commands
//!
//! - `follow` - Open a session and print sync events
//! - `save` - Ask the server to save a document

mod commands;

use clap::{Parser, Subcommand};
use commands::ConnectOptions;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// textsync command-line client.
#[derive(Parser)]
#[command(name = "textsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(global = true, short, long, default_value = "http://localhost:8080")]
    server: String,

    /// Share token for public access
    #[arg(global = true, long)]
    share_token: Option<String>,

    /// Guest name for public sessions (random if omitted)
    #[arg(global = true, long)]
    guest_name: Option<String>,

    /// Request timeout in seconds
    #[arg(global = true, long, default_value = "30")]
    timeout: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session and print sync events
    Follow {
        /// File to open by ID
        #[arg(long)]
        file_id: Option<i64>,

        /// File to open by path
        #[arg(long)]
        file_path: Option<String>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Ask the server to save a document
    Save {
        /// File to open by ID
        #[arg(long)]
        file_id: Option<i64>,

        /// File to open by path
        #[arg(long)]
        file_path: Option<String>,

        /// Overwrite changes made outside the session
        #[arg(long)]
        force: bool,

        /// Seconds to wait for the save confirmation
        #[arg(short, long, default_value = "10")]
        wait: u64,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let connect = ConnectOptions {
        server: cli.server,
        share_token: cli.share_token,
        guest_name: cli.guest_name,
        timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Commands::Follow {
            file_id,
            file_path,
            duration,
            format,
        } => {
            let target = commands::target(file_id, file_path.clone())?;
            commands::follow::run(&connect, target, file_path.as_deref(), duration, &format)
                .await?;
        }
        Commands::Save {
            file_id,
            file_path,
            force,
            wait,
        } => {
            let target = commands::target(file_id, file_path.clone())?;
            commands::save::run(
                &connect,
                target,
                file_path.as_deref(),
                force,
                Duration::from_secs(wait),
            )
            .await?;
        }
        Commands::Version => {
            println!("textsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
