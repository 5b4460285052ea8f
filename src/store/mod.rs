//! Corpus store for ragtube.
//!
//! Holds channels, videos, captions, chunks and their embeddings, plus the
//! persisted vector indexes built over those embeddings.

mod sqlite;

pub use sqlite::CorpusStore;

use crate::error::{RagtubeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A YouTube channel. Created once by the sync and never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Provider-assigned channel ID.
    pub id: String,
    /// Channel title at first sync.
    pub title: String,
}

impl Channel {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// A video published on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    /// Provider-assigned video ID.
    pub id: String,
    pub title: String,
    pub publish_time: DateTime<Utc>,
    /// Concatenated caption text; `None` until captions are stored.
    pub content: Option<String>,
    pub channel_id: String,
}

impl Video {
    /// Create a discovered video without content.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        publish_time: DateTime<Utc>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            publish_time,
            content: None,
            channel_id: channel_id.into(),
        }
    }

    /// Watch URL for this video.
    pub fn watch_url(&self) -> String {
        watch_url(&self.id)
    }
}

/// Watch URL for a video ID.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// A single caption line of a video transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    /// Store-assigned ID, `None` before insertion.
    pub id: Option<i64>,
    pub text: String,
    /// Start offset in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
    pub video_id: String,
}

impl Caption {
    pub fn new(text: impl Into<String>, start: f64, duration: f64, video_id: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            start,
            duration,
            video_id: video_id.into(),
        }
    }
}

/// A slice of a video's transcript, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub content: String,
    /// `None` until the embedding stage has processed this chunk.
    pub embedding: Option<Vec<f32>>,
    pub video_id: String,
}

/// A chunk joined with the presentation metadata of its parent video.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkContext {
    pub chunk_id: i64,
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub publish_time: DateTime<Utc>,
    pub content: String,
}

/// Summary of a stored video.
#[derive(Debug, Clone, Serialize)]
pub struct VideoSummary {
    pub id: String,
    pub title: String,
    pub publish_time: DateTime<Utc>,
    pub channel_id: String,
    pub chunk_count: usize,
    pub embedded_count: usize,
}

/// A persisted vector index definition and its serialized graph.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub name: String,
    pub metric: String,
    pub m: usize,
    pub ef_construction: usize,
    pub dimensions: usize,
    pub graph: String,
}

/// Serialize an embedding to little-endian bytes.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize an embedding, checking it has the expected dimensionality.
pub fn bytes_to_embedding(bytes: &[u8], dimensions: usize) -> Result<Vec<f32>> {
    if bytes.len() != dimensions * 4 {
        return Err(RagtubeError::DimensionMismatch {
            expected: dimensions,
            got: bytes.len() / 4,
        });
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
