//! CLI module for ragtube.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// ragtube - question answering over YouTube channels
///
/// Syncs channel transcripts into a local corpus, indexes them for
/// similarity search and answers questions grounded in what was said.
#[derive(Parser, Debug)]
#[command(name = "ragtube")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "RAGTUBE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync channel transcripts, then chunk, embed and index them
    Sync {
        /// Channel ids (defaults to sync.channel_ids from the config)
        channel_ids: Vec<String>,
    },

    /// Manage the vector index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Search for the transcript chunks closest to a query
    Search {
        /// Search query
        query: String,

        /// Restrict results to one channel
        #[arg(long)]
        channel: Option<String>,

        /// Maximum number of results (defaults to retrieval.results_to_retrieve)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Ask a question and get an answer grounded in the transcripts
    Ask {
        /// The question to ask
        question: String,

        /// Restrict context to one channel
        #[arg(long)]
        channel: Option<String>,

        /// LLM model to use for response generation
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List synced channels and videos
    List {
        /// Only list videos of this channel
        #[arg(long)]
        channel: Option<String>,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Build the index if it does not exist, otherwise add new chunks to it
    Build {
        /// Index name (defaults to index.name)
        name: Option<String>,
    },

    /// Drop the index
    Drop {
        /// Index name (defaults to index.name)
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration file if none exists
    Init,

    /// Show configuration file path
    Path,
}
