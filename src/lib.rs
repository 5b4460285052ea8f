//! ragtube - question answering over YouTube channels
//!
//! Incrementally syncs channel transcripts into a local corpus, splits them
//! into overlapping chunks, embeds them and answers questions from the
//! chunks closest to the query.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `store` - SQLite corpus store (channels, videos, captions, chunks)
//! - `transcript` - Transcript provider and incremental channel sync
//! - `chunking` - Token-window chunking
//! - `embedding` - Embedding generation
//! - `index` - Persisted HNSW vector index
//! - `retrieval` - Nearest-neighbour retrieval and re-ranking
//! - `rag` - RAG engine for question answering
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use ragtube::config::Settings;
//! use ragtube::orchestrator::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = Pipeline::new(settings).await?;
//!
//!     let channels = vec!["UC34rhn8Um7R18-BHjPklYlw".to_string()];
//!     let report = pipeline.run(pipeline.youtube_provider()?, &channels).await?;
//!     println!("Embedded {} chunks", report.chunks_embedded);
//!
//!     let engine = pipeline.build_rag_engine().await?;
//!     let answer = engine.answer_query("What is agile?", None).await?;
//!     println!("{}", answer.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod retrieval;
pub mod store;
pub mod transcript;

pub use error::{RagtubeError, Result};
