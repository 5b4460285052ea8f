//! Chunking of video transcripts into overlapping token windows.

mod splitter;

pub use splitter::{load_tokenizer, TokenSplitter};

#[cfg(test)]
pub(crate) use splitter::tests::whitespace_tokenizer;

use crate::config::ChunkingSettings;
use crate::error::Result;
use crate::store::{CorpusStore, Video};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{debug, info, instrument};

/// Creates chunks for every video that has content but no chunks yet.
pub struct ChunkTask {
    store: Arc<CorpusStore>,
    splitter: TokenSplitter,
}

impl ChunkTask {
    pub fn new(
        store: Arc<CorpusStore>,
        tokenizer: Arc<Tokenizer>,
        settings: &ChunkingSettings,
    ) -> Result<Self> {
        Ok(Self {
            store,
            splitter: TokenSplitter::new(tokenizer, settings.chunk_size, settings.chunk_overlap)?,
        })
    }

    /// Videos with content and no chunks.
    pub fn missing_videos(&self) -> Result<Vec<Video>> {
        self.store.videos_needing_chunks()
    }

    /// Split a video's content.
    pub fn split(&self, content: &str) -> Result<Vec<String>> {
        self.splitter.split(content)
    }

    /// Chunk every pending video, one transaction per video. Returns the
    /// number of chunks created.
    #[instrument(skip(self))]
    pub fn launch(&self) -> Result<usize> {
        let videos = self.missing_videos()?;
        if videos.is_empty() {
            debug!("No videos need chunking");
            return Ok(0);
        }

        let mut created = 0;
        for video in &videos {
            let Some(content) = video.content.as_deref() else {
                continue;
            };
            let chunks = self.split(content)?;
            created += self.store.insert_chunks(&video.id, &chunks)?;
            debug!("Video {} split into {} chunks", video.id, chunks.len());
        }

        info!("Created {} chunks for {} videos", created, videos.len());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Caption, Channel};
    use crate::transcript::derive_content;
    use chrono::Utc;

    fn settings(chunk_size: usize, chunk_overlap: usize) -> ChunkingSettings {
        ChunkingSettings {
            chunk_size,
            chunk_overlap,
            ..ChunkingSettings::default()
        }
    }

    fn store_with_video(content_words: &[&str]) -> Arc<CorpusStore> {
        let store = Arc::new(CorpusStore::in_memory(2).unwrap());
        store
            .insert_channel_if_absent(&Channel::new("UC34rhn8Um7R18-BHjPklYlw", "diego garrido"))
            .unwrap();

        let mut captions: Vec<Caption> = content_words
            .iter()
            .enumerate()
            .map(|(i, text)| Caption::new(*text, i as f64, 1.0, "Guy5D3PJlZk"))
            .collect();
        let mut video = Video::new("Guy5D3PJlZk", "Agile Manifesto", Utc::now(), "UC34rhn8Um7R18-BHjPklYlw");
        video.content = Some(derive_content(&mut captions));
        store.insert_transcribed_video(&video, &captions).unwrap();
        store
    }

    #[test]
    fn test_agile_transcript_chunks() {
        let store = store_with_video(&[
            "I often make this joke which is agile's",
            "a lot like communism you know people",
            "just keep not trying it correctly um",
            "what is what is the correct way to",
            "Agile oh gee um it's a real simple idea",
            "right uh do things in really short",
            "sequences measure how much you get done",
            "in every sequence use that measurement",
            "to project an end date and tell",
            "everybody that's kind of it",
        ]);
        let task = ChunkTask::new(store.clone(), whitespace_tokenizer(), &settings(25, 5)).unwrap();

        assert_eq!(task.launch().unwrap(), 4);

        let chunks = store.chunks_for_video("Guy5D3PJlZk").unwrap();
        assert_eq!(
            chunks[0].content,
            "I often make this joke which is agile's a lot like communism you know people \
             just keep not trying it correctly um what is what"
        );
        assert_eq!(
            chunks[3].content,
            "project an end date and tell everybody that's kind of it"
        );
        assert!(chunks.iter().all(|c| c.embedding.is_none()));
    }

    #[test]
    fn test_rerun_is_noop() {
        let store = store_with_video(&["one two three"]);
        let task = ChunkTask::new(store.clone(), whitespace_tokenizer(), &settings(25, 5)).unwrap();

        assert_eq!(task.launch().unwrap(), 1);
        assert!(task.missing_videos().unwrap().is_empty());
        assert_eq!(task.launch().unwrap(), 0);
        assert_eq!(store.chunk_count(None).unwrap(), 1);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let store = Arc::new(CorpusStore::in_memory(2).unwrap());
        assert!(ChunkTask::new(store, whitespace_tokenizer(), &settings(5, 5)).is_err());
    }
}
