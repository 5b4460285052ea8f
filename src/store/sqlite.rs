//! SQLite-backed corpus store.
//!
//! Foreign keys are enforced by SQLite (`ON DELETE CASCADE`), embeddings are
//! little-endian f32 blobs whose width is fixed when the database is created.

use super::{
    bytes_to_embedding, embedding_to_bytes, Caption, Channel, Chunk, ChunkContext, IndexRecord,
    Video, VideoSummary,
};
use crate::error::{RagtubeError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS channels (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS videos (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        publish_time TEXT NOT NULL,
        content TEXT,
        channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_videos_channel_id ON videos(channel_id);

    CREATE TABLE IF NOT EXISTS captions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        start REAL NOT NULL,
        duration REAL NOT NULL,
        video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_captions_video_id ON captions(video_id);

    CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        embedding BLOB,
        video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_video_id ON chunks(video_id);

    CREATE TABLE IF NOT EXISTS vector_indexes (
        name TEXT PRIMARY KEY,
        metric TEXT NOT NULL,
        m INTEGER NOT NULL,
        ef_construction INTEGER NOT NULL,
        dimensions INTEGER NOT NULL,
        graph TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

/// SQLite-based corpus store.
pub struct CorpusStore {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl CorpusStore {
    /// Open (or create) a store at `path` with the given embedding width.
    #[instrument(skip_all)]
    pub fn new(path: &Path, dimensions: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Self::init(conn, dimensions)?;
        info!("Opened corpus store at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagtubeError::ConfigInvalid(
                "embedding dimensions must be greater than 0".to_string(),
            ));
        }

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'embedding_dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(value) => {
                let existing: usize = value.parse().map_err(|_| {
                    RagtubeError::ConfigInvalid(format!(
                        "corrupt embedding_dimensions in store: {}",
                        value
                    ))
                })?;
                if existing != dimensions {
                    return Err(RagtubeError::ConfigInvalid(format!(
                        "store was created with {}-dimensional embeddings, configuration asks for {}",
                        existing, dimensions
                    )));
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO store_meta (key, value) VALUES ('embedding_dimensions', ?1)",
                    params![dimensions.to_string()],
                )?;
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RagtubeError::InvalidInput(format!("Failed to acquire store lock: {}", e)))
    }

    /// Embedding width every stored vector must have.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(RagtubeError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }
        Ok(())
    }

    // --- Channels ---

    /// Insert a channel unless it already exists. Returns whether a row was inserted.
    #[instrument(skip(self, channel), fields(channel_id = %channel.id))]
    pub fn insert_channel_if_absent(&self, channel: &Channel) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO channels (id, title) VALUES (?1, ?2)",
            params![channel.id, channel.title],
        )?;
        if inserted > 0 {
            info!("Added channel '{}'", channel.title);
        }
        Ok(inserted > 0)
    }

    pub fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let conn = self.conn()?;
        let channel = conn
            .query_row(
                "SELECT id, title FROM channels WHERE id = ?1",
                params![channel_id],
                |row| {
                    Ok(Channel {
                        id: row.get(0)?,
                        title: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(channel)
    }

    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, title FROM channels ORDER BY title")?;
        let rows = stmt.query_map([], |row| {
            Ok(Channel {
                id: row.get(0)?,
                title: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete a channel and, by cascade, its videos, captions and chunks.
    pub fn delete_channel(&self, channel_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM channels WHERE id = ?1", params![channel_id])?;
        info!("Deleted channel {} ({} rows)", channel_id, deleted);
        Ok(deleted > 0)
    }

    // --- Videos and captions ---

    /// IDs of the videos stored under a channel.
    pub fn video_ids_for_channel(&self, channel_id: &str) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM videos WHERE channel_id = ?1")?;
        let rows = stmt.query_map(params![channel_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
    }

    /// Persist a transcribed video together with all of its captions.
    ///
    /// Either everything is written or nothing is: a concurrent insert of the
    /// same video fails with [`RagtubeError::ConstraintViolation`].
    #[instrument(skip(self, video, captions), fields(video_id = %video.id, captions = captions.len()))]
    pub fn insert_transcribed_video(&self, video: &Video, captions: &[Caption]) -> Result<()> {
        let content = video.content.as_deref().ok_or_else(|| {
            RagtubeError::InvalidInput(format!("video {} has no content", video.id))
        })?;
        if captions.is_empty() {
            return Err(RagtubeError::InvalidInput(format!(
                "video {} has content but no captions",
                video.id
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO videos (id, title, publish_time, content, channel_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                video.id,
                video.title,
                video.publish_time.to_rfc3339(),
                content,
                video.channel_id,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO captions (text, start, duration, video_id) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for caption in captions {
                stmt.execute(params![caption.text, caption.start, caption.duration, video.id])?;
            }
        }

        tx.commit()?;
        debug!("Stored video {} with {} captions", video.id, captions.len());
        Ok(())
    }

    pub fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        let conn = self.conn()?;
        let video = conn
            .query_row(
                "SELECT id, title, publish_time, content, channel_id FROM videos WHERE id = ?1",
                params![video_id],
                video_from_row,
            )
            .optional()?;
        Ok(video)
    }

    /// Captions of a video ordered by start offset.
    pub fn captions_for_video(&self, video_id: &str) -> Result<Vec<Caption>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, text, start, duration, video_id FROM captions
             WHERE video_id = ?1 ORDER BY start, id",
        )?;
        let rows = stmt.query_map(params![video_id], |row| {
            Ok(Caption {
                id: row.get(0)?,
                text: row.get(1)?,
                start: row.get(2)?,
                duration: row.get(3)?,
                video_id: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Videos with their chunk counts, newest first.
    pub fn list_videos(&self, channel_id: Option<&str>) -> Result<Vec<VideoSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT v.id, v.title, v.publish_time, v.channel_id,
                    COUNT(c.id), COUNT(c.embedding)
             FROM videos v
             LEFT JOIN chunks c ON c.video_id = v.id
             WHERE ?1 IS NULL OR v.channel_id = ?1
             GROUP BY v.id
             ORDER BY v.publish_time DESC",
        )?;
        let rows = stmt.query_map(params![channel_id], |row| {
            Ok(VideoSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                publish_time: parse_time(2, row.get(2)?)?,
                channel_id: row.get(3)?,
                chunk_count: row.get::<_, i64>(4)? as usize,
                embedded_count: row.get::<_, i64>(5)? as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete a video and, by cascade, its captions and chunks.
    pub fn delete_video(&self, video_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM videos WHERE id = ?1", params![video_id])?;
        Ok(deleted > 0)
    }

    // --- Chunks ---

    /// Videos that have content but no chunks yet.
    #[instrument(skip(self))]
    pub fn videos_needing_chunks(&self) -> Result<Vec<Video>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT v.id, v.title, v.publish_time, v.content, v.channel_id
             FROM videos v
             LEFT JOIN chunks c ON c.video_id = v.id
             WHERE v.content IS NOT NULL AND c.id IS NULL
             ORDER BY v.rowid",
        )?;
        let rows = stmt.query_map([], video_from_row)?;
        let videos = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("{} videos need chunks", videos.len());
        Ok(videos)
    }

    /// Insert the chunks of one video in a single transaction.
    #[instrument(skip(self, contents), fields(count = contents.len()))]
    pub fn insert_chunks(&self, video_id: &str, contents: &[String]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO chunks (content, embedding, video_id) VALUES (?1, NULL, ?2)")?;
            for content in contents {
                stmt.execute(params![content, video_id])?;
            }
        }
        tx.commit()?;
        Ok(contents.len())
    }

    pub fn get_chunk(&self, chunk_id: i64) -> Result<Option<Chunk>> {
        Ok(self
            .query_chunks(
                "SELECT id, content, embedding, video_id FROM chunks WHERE id = ?1",
                params![chunk_id],
            )?
            .pop())
    }

    pub fn chunks_for_video(&self, video_id: &str) -> Result<Vec<Chunk>> {
        self.query_chunks(
            "SELECT id, content, embedding, video_id FROM chunks WHERE video_id = ?1 ORDER BY id",
            params![video_id],
        )
    }

    /// Chunks whose embedding has not been computed yet.
    #[instrument(skip(self))]
    pub fn chunks_missing_embedding(&self) -> Result<Vec<Chunk>> {
        self.query_chunks(
            "SELECT id, content, embedding, video_id FROM chunks WHERE embedding IS NULL ORDER BY id",
            [],
        )
    }

    fn query_chunks<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Chunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<Vec<u8>>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            let (id, content, embedding, video_id) = row?;
            let embedding = embedding
                .map(|bytes| bytes_to_embedding(&bytes, self.dimensions))
                .transpose()?;
            chunks.push(Chunk {
                id,
                content,
                embedding,
                video_id,
            });
        }
        Ok(chunks)
    }

    /// Write embeddings for existing chunks in one transaction.
    ///
    /// Every vector must match the store's dimensionality; a single mismatch
    /// aborts the whole write.
    #[instrument(skip(self, embeddings), fields(count = embeddings.len()))]
    pub fn write_embeddings(&self, embeddings: &[(i64, Vec<f32>)]) -> Result<usize> {
        for (_, embedding) in embeddings {
            self.check_dimensions(embedding)?;
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare("UPDATE chunks SET embedding = ?1 WHERE id = ?2")?;
            for (chunk_id, embedding) in embeddings {
                written += stmt.execute(params![embedding_to_bytes(embedding), chunk_id])?;
            }
        }
        tx.commit()?;

        info!("Wrote {} embeddings", written);
        Ok(written)
    }

    /// Clear every stored embedding so the embedding stage recomputes them.
    pub fn clear_embeddings(&self) -> Result<usize> {
        let conn = self.conn()?;
        let cleared = conn.execute("UPDATE chunks SET embedding = NULL WHERE embedding IS NOT NULL", [])?;
        info!("Cleared {} embeddings", cleared);
        Ok(cleared)
    }

    /// Embedded chunk vectors in row order, optionally restricted to a channel.
    pub fn embedded_vectors(&self, channel_id: Option<&str>) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.embedding
             FROM chunks c
             JOIN videos v ON v.id = c.video_id
             WHERE c.embedding IS NOT NULL AND (?1 IS NULL OR v.channel_id = ?1)
             ORDER BY c.id",
        )?;
        let rows = stmt.query_map(params![channel_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut vectors = Vec::new();
        for row in rows {
            let (id, bytes) = row?;
            vectors.push((id, bytes_to_embedding(&bytes, self.dimensions)?));
        }
        Ok(vectors)
    }

    /// IDs of the embedded chunks belonging to a channel.
    pub fn embedded_chunk_ids_for_channel(&self, channel_id: &str) -> Result<HashSet<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id FROM chunks c
             JOIN videos v ON v.id = c.video_id
             WHERE c.embedding IS NOT NULL AND v.channel_id = ?1",
        )?;
        let rows = stmt.query_map(params![channel_id], |row| row.get::<_, i64>(0))?;
        Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
    }

    /// Presentation metadata for the given chunk IDs.
    pub fn chunk_contexts(&self, chunk_ids: &[i64]) -> Result<HashMap<i64, ChunkContext>> {
        if chunk_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let sql = format!(
            "SELECT c.id, v.id, v.channel_id, v.title, v.publish_time, c.content
             FROM chunks c
             JOIN videos v ON v.id = c.video_id
             WHERE c.id IN ({})",
            placeholders
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk_ids.iter()), |row| {
            Ok(ChunkContext {
                chunk_id: row.get(0)?,
                video_id: row.get(1)?,
                channel_id: row.get(2)?,
                title: row.get(3)?,
                publish_time: parse_time(4, row.get(4)?)?,
                content: row.get(5)?,
            })
        })?;

        let mut contexts = HashMap::with_capacity(chunk_ids.len());
        for row in rows {
            let context = row?;
            contexts.insert(context.chunk_id, context);
        }
        Ok(contexts)
    }

    /// Number of chunks, optionally restricted to a channel.
    pub fn chunk_count(&self, channel_id: Option<&str>) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks c
             JOIN videos v ON v.id = c.video_id
             WHERE ?1 IS NULL OR v.channel_id = ?1",
            params![channel_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Number of chunks carrying an embedding, optionally restricted to a channel.
    pub fn embedded_chunk_count(&self, channel_id: Option<&str>) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks c
             JOIN videos v ON v.id = c.video_id
             WHERE c.embedding IS NOT NULL AND (?1 IS NULL OR v.channel_id = ?1)",
            params![channel_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // --- Vector indexes ---

    pub fn get_index_record(&self, name: &str) -> Result<Option<IndexRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT name, metric, m, ef_construction, dimensions, graph
                 FROM vector_indexes WHERE name = ?1",
                params![name],
                |row| {
                    Ok(IndexRecord {
                        name: row.get(0)?,
                        metric: row.get(1)?,
                        m: row.get::<_, i64>(2)? as usize,
                        ef_construction: row.get::<_, i64>(3)? as usize,
                        dimensions: row.get::<_, i64>(4)? as usize,
                        graph: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Insert a new index record. Fails with a constraint violation if the
    /// name is already taken.
    pub fn insert_index_record(&self, record: &IndexRecord) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO vector_indexes
             (name, metric, m, ef_construction, dimensions, graph, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                record.name,
                record.metric,
                record.m as i64,
                record.ef_construction as i64,
                record.dimensions as i64,
                record.graph,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn update_index_graph(&self, name: &str, graph: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE vector_indexes SET graph = ?1, updated_at = ?2 WHERE name = ?3",
            params![graph, Utc::now().to_rfc3339(), name],
        )?;
        if updated == 0 {
            return Err(RagtubeError::NotFound(format!("vector index {}", name)));
        }
        Ok(())
    }

    /// Remove an index record. Returns whether one existed.
    pub fn delete_index_record(&self, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM vector_indexes WHERE name = ?1", params![name])?;
        Ok(deleted > 0)
    }
}

fn video_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        title: row.get(1)?,
        publish_time: parse_time(2, row.get(2)?)?,
        content: row.get(3)?,
        channel_id: row.get(4)?,
    })
}

fn parse_time(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn publish_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 9, 16, 3, 23).unwrap()
    }

    fn seeded_store() -> CorpusStore {
        let store = CorpusStore::in_memory(2).unwrap();
        store
            .insert_channel_if_absent(&Channel::new("UC34rhn8Um7R18-BHjPklYlw", "diego garrido"))
            .unwrap();

        let mut video = Video::new("Guy5D3PJlZk", "Agile Manifesto", publish_time(), "UC34rhn8Um7R18-BHjPklYlw");
        video.content = Some("b a".to_string());
        let captions = vec![
            Caption::new("b", 0.0, 1.0, "Guy5D3PJlZk"),
            Caption::new("a", 2.0, 1.0, "Guy5D3PJlZk"),
        ];
        store.insert_transcribed_video(&video, &captions).unwrap();
        store
    }

    #[test]
    fn test_channel_insert_is_idempotent() {
        let store = CorpusStore::in_memory(2).unwrap();
        let channel = Channel::new("UC1", "one");
        assert!(store.insert_channel_if_absent(&channel).unwrap());
        assert!(!store.insert_channel_if_absent(&channel).unwrap());
        assert_eq!(store.list_channels().unwrap(), vec![channel]);
    }

    #[test]
    fn test_video_round_trip_with_captions() {
        let store = seeded_store();
        let video = store.get_video("Guy5D3PJlZk").unwrap().unwrap();
        assert_eq!(video.content.as_deref(), Some("b a"));
        assert_eq!(video.publish_time, publish_time());

        let captions = store.captions_for_video("Guy5D3PJlZk").unwrap();
        assert_eq!(captions.len(), 2);
        assert!(captions.iter().all(|c| c.id.is_some()));
    }

    #[test]
    fn test_duplicate_video_is_constraint_violation() {
        let store = seeded_store();
        let mut video = Video::new("Guy5D3PJlZk", "Agile Manifesto", publish_time(), "UC34rhn8Um7R18-BHjPklYlw");
        video.content = Some("x".to_string());
        let err = store
            .insert_transcribed_video(&video, &[Caption::new("x", 0.0, 1.0, "Guy5D3PJlZk")])
            .unwrap_err();
        assert!(matches!(err, RagtubeError::ConstraintViolation(_)));

        // The failed transaction left the original captions untouched.
        assert_eq!(store.captions_for_video("Guy5D3PJlZk").unwrap().len(), 2);
    }

    #[test]
    fn test_video_requires_known_channel() {
        let store = CorpusStore::in_memory(2).unwrap();
        let mut video = Video::new("v1", "t", publish_time(), "UC-missing");
        video.content = Some("x".to_string());
        let err = store
            .insert_transcribed_video(&video, &[Caption::new("x", 0.0, 1.0, "v1")])
            .unwrap_err();
        assert!(matches!(err, RagtubeError::ConstraintViolation(_)));
    }

    #[test]
    fn test_video_without_content_is_rejected() {
        let store = seeded_store();
        let video = Video::new("v2", "t", publish_time(), "UC34rhn8Um7R18-BHjPklYlw");
        assert!(matches!(
            store.insert_transcribed_video(&video, &[Caption::new("x", 0.0, 1.0, "v2")]),
            Err(RagtubeError::InvalidInput(_))
        ));
        assert!(store.get_video("v2").unwrap().is_none());
    }

    #[test]
    fn test_videos_needing_chunks_is_anti_join() {
        let store = seeded_store();
        assert_eq!(store.videos_needing_chunks().unwrap().len(), 1);

        store
            .insert_chunks("Guy5D3PJlZk", &["b a".to_string()])
            .unwrap();
        assert!(store.videos_needing_chunks().unwrap().is_empty());
        assert_eq!(store.chunks_missing_embedding().unwrap().len(), 1);
    }

    #[test]
    fn test_embedding_width_is_enforced() {
        let store = seeded_store();
        store.insert_chunks("Guy5D3PJlZk", &["b a".to_string()]).unwrap();
        let chunk = &store.chunks_missing_embedding().unwrap()[0];

        let err = store.write_embeddings(&[(chunk.id, vec![1.0, 2.0, 3.0])]).unwrap_err();
        assert!(matches!(err, RagtubeError::DimensionMismatch { expected: 2, got: 3 }));
        assert_eq!(store.chunks_missing_embedding().unwrap().len(), 1);

        store.write_embeddings(&[(chunk.id, vec![1.0, 2.0])]).unwrap();
        assert!(store.chunks_missing_embedding().unwrap().is_empty());
        assert_eq!(
            store.get_chunk(chunk.id).unwrap().unwrap().embedding,
            Some(vec![1.0, 2.0])
        );
        assert_eq!(store.embedded_vectors(None).unwrap(), vec![(chunk.id, vec![1.0, 2.0])]);
        assert_eq!(store.embedded_chunk_count(None).unwrap(), 1);
        assert_eq!(store.embedded_chunk_count(Some("UC-missing")).unwrap(), 0);

        assert_eq!(store.clear_embeddings().unwrap(), 1);
        assert_eq!(store.embedded_chunk_count(None).unwrap(), 0);
        assert_eq!(store.chunks_missing_embedding().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_channel_cascades() {
        let store = seeded_store();
        store.insert_chunks("Guy5D3PJlZk", &["b a".to_string()]).unwrap();

        assert!(store.delete_channel("UC34rhn8Um7R18-BHjPklYlw").unwrap());
        assert!(store.get_video("Guy5D3PJlZk").unwrap().is_none());
        assert!(store.captions_for_video("Guy5D3PJlZk").unwrap().is_empty());
        assert_eq!(store.chunk_count(None).unwrap(), 0);
    }

    #[test]
    fn test_reopen_with_other_dimensions_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");
        drop(CorpusStore::new(&path, 4).unwrap());

        assert!(CorpusStore::new(&path, 4).is_ok());
        assert!(matches!(
            CorpusStore::new(&path, 8),
            Err(RagtubeError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_index_records() {
        let store = CorpusStore::in_memory(2).unwrap();
        let record = IndexRecord {
            name: "chunk_index".to_string(),
            metric: "l2".to_string(),
            m: 16,
            ef_construction: 64,
            dimensions: 2,
            graph: "{}".to_string(),
        };

        store.insert_index_record(&record).unwrap();
        assert!(matches!(
            store.insert_index_record(&record),
            Err(RagtubeError::ConstraintViolation(_))
        ));
        store.update_index_graph("chunk_index", "{\"nodes\":[]}").unwrap();
        assert_eq!(
            store.get_index_record("chunk_index").unwrap().unwrap().graph,
            "{\"nodes\":[]}"
        );
        assert!(store.delete_index_record("chunk_index").unwrap());
        assert!(!store.delete_index_record("chunk_index").unwrap());
    }
}
