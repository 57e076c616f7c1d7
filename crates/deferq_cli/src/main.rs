//! deferq CLI
//!
//! Command-line tools for a file-backed deferq store.
//!
//! # Commands
//!
//! - `inspect` - List queued requests and stored state
//! - `serviceable` - Show which queued requests the next replay would send
//! - `prune` - Delete queued requests the next replay would discard
//! - `subscription` - Print the stored push subscription identifier

mod commands;

use clap::{Parser, Subcommand};
use deferq_store::FileStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// deferq request queue tools.
#[derive(Parser)]
#[command(name = "deferq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store root directory
    #[arg(global = true, short, long)]
    root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List queued requests and stored state
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show which queued requests the next replay would send
    Serviceable {
        /// Assume a live push subscription exists
        #[arg(short, long)]
        subscribed: bool,

        /// Body property naming the topic of a topic update
        #[arg(short, long, default_value = "tag")]
        topic_property: String,
    },

    /// Delete queued requests the next replay would discard
    Prune {
        /// Assume a live push subscription exists
        #[arg(short, long)]
        subscribed: bool,

        /// Body property naming the topic of a topic update
        #[arg(short, long, default_value = "tag")]
        topic_property: String,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Print the stored push subscription identifier
    Subscription,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("deferq CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let root = cli.root.ok_or("Store root required (--root)")?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(dispatch(root, cli.command))
}

async fn dispatch(root: PathBuf, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(&root).await?;
    match command {
        Commands::Inspect { format } => commands::inspect::run(store, &format).await,
        Commands::Serviceable {
            subscribed,
            topic_property,
        } => commands::serviceable::run(store, subscribed, &topic_property).await,
        Commands::Prune {
            subscribed,
            topic_property,
            dry_run,
        } => commands::prune::run(store, subscribed, &topic_property, dry_run).await,
        Commands::Subscription => commands::subscription::run(store).await,
        Commands::Version => Ok(()),
    }
}
