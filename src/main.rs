//! ragtube CLI entry point.

use anyhow::Result;
use clap::Parser;
use ragtube::cli::{commands, Cli, Commands};
use ragtube::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("ragtube={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let config_path = cli.config.as_deref().map(Settings::expand_path);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Ensure the data directory exists
    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match &cli.command {
        Commands::Sync { channel_ids } => {
            commands::run_sync(channel_ids, settings).await?;
        }

        Commands::Index { action } => {
            commands::run_index(action, settings)?;
        }

        Commands::Search {
            query,
            channel,
            limit,
        } => {
            commands::run_search(query, channel.as_deref(), *limit, settings).await?;
        }

        Commands::Ask {
            question,
            channel,
            model,
        } => {
            commands::run_ask(question, channel.as_deref(), model.clone(), settings).await?;
        }

        Commands::List { channel } => {
            commands::run_list(channel.as_deref(), settings)?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, config_path, settings)?;
        }
    }

    Ok(())
}
