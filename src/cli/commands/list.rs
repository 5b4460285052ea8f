//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::store::CorpusStore;
use anyhow::Result;

/// Run the list command.
pub fn run_list(channel: Option<&str>, settings: Settings) -> Result<()> {
    let store = CorpusStore::new(&settings.sqlite_path(), settings.embedding.dimensions)?;

    let channels = store.list_channels()?;
    if channels.is_empty() {
        Output::info("No channels synced yet. Use 'ragtube sync <CHANNEL_ID>' to add content.");
        return Ok(());
    }

    let mut total_videos = 0;
    let mut total_chunks = 0;
    for ch in channels.iter().filter(|c| channel.map_or(true, |id| id == c.id)) {
        let videos = store.list_videos(Some(&ch.id))?;
        Output::header(&format!("{} ({}, {} videos)", ch.title, ch.id, videos.len()));
        println!();

        for video in &videos {
            Output::video_info(
                &video.title,
                &video.id,
                &video.publish_time,
                video.chunk_count,
                video.embedded_count,
            );
        }
        total_videos += videos.len();
        total_chunks += videos.iter().map(|v| v.chunk_count).sum::<usize>();
    }

    println!();
    Output::kv("Total videos", &total_videos.to_string());
    Output::kv("Total chunks", &total_chunks.to_string());
    Ok(())
}
