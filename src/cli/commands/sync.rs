//! Sync command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{IndexUpdate, Pipeline};
use anyhow::Result;

/// Run the sync command.
pub async fn run_sync(channel_ids: &[String], settings: Settings) -> Result<()> {
    let channel_ids = if channel_ids.is_empty() {
        settings.sync.channel_ids.clone()
    } else {
        channel_ids.to_vec()
    };
    if channel_ids.is_empty() {
        Output::error("No channels to sync.");
        Output::info("Pass channel ids, or set sync.channel_ids in the config.");
        anyhow::bail!("no channels to sync");
    }

    if let Err(e) = preflight::check(Operation::Sync, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let pipeline = Pipeline::new(settings).await?;
    let provider = pipeline.youtube_provider()?;

    let spinner = Output::spinner(&format!("Syncing {} channels...", channel_ids.len()));
    let result = pipeline.run(provider, &channel_ids).await;
    spinner.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            Output::error(&format!("Sync failed: {}", e));
            return Err(e.into());
        }
    };

    Output::header("Channels");
    for channel in &report.channels {
        match &channel.result {
            Ok(sync) => Output::success(&format!(
                "{}: {} videos listed, {} new, {} transcribed, {} skipped, {} failed",
                channel.channel_id,
                sync.discovered,
                sync.missing,
                sync.transcribed,
                sync.skipped,
                sync.failed
            )),
            Err(e) => Output::error(&format!("{}: {}", channel.channel_id, e)),
        }
    }

    println!();
    Output::kv("Chunks created", &report.chunks_created.to_string());
    Output::kv("Chunks embedded", &report.chunks_embedded.to_string());
    match report.index {
        IndexUpdate::Built(n) => Output::kv("Index", &format!("built over {} chunks", n)),
        IndexUpdate::Refreshed(n) => Output::kv("Index", &format!("{} chunks added", n)),
    }

    let failed = report.failed_channels().count();
    if failed > 0 {
        anyhow::bail!("{} of {} channels failed to sync", failed, report.channels.len());
    }
    Ok(())
}
