//! Token-window splitting.

use crate::error::{RagtubeError, Result};
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Load a tokenizer from a `tokenizer.json` file, or fetch it from the
/// Hugging Face Hub when `source` is not a file.
pub fn load_tokenizer(source: &str) -> Result<Tokenizer> {
    let expanded = shellexpand::tilde(source);
    let path = Path::new(expanded.as_ref());

    let tokenizer = if path.is_file() {
        debug!("Loading tokenizer from {}", path.display());
        Tokenizer::from_file(path)
    } else {
        info!("Fetching tokenizer {}", source);
        Tokenizer::from_pretrained(source, None)
    };
    tokenizer.map_err(|e| RagtubeError::Tokenizer(format!("{}: {}", source, e)))
}

/// Splits text into overlapping windows of tokenizer tokens.
///
/// Chunks are cut from the original text at token offsets, so nothing is
/// lost to decoding.
#[derive(Clone)]
pub struct TokenSplitter {
    tokenizer: Arc<Tokenizer>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TokenSplitter {
    /// Create a splitter. The overlap must be smaller than the chunk size.
    pub fn new(tokenizer: Arc<Tokenizer>, chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagtubeError::ConfigInvalid(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagtubeError::ConfigInvalid(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            tokenizer,
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `content` into chunks of at most `chunk_size` tokens, each
    /// sharing `chunk_overlap` tokens with the previous one.
    ///
    /// Non-blank content always yields at least one chunk; blank content
    /// yields none.
    pub fn split(&self, content: &str) -> Result<Vec<String>> {
        let encoding = self
            .tokenizer
            .encode(content, false)
            .map_err(|e| RagtubeError::Tokenizer(e.to_string()))?;
        let offsets = encoding.get_offsets();
        let step = self.chunk_size - self.chunk_overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < offsets.len() {
            let end = (start + self.chunk_size).min(offsets.len());
            let window = content
                .get(offsets[start].0..offsets[end - 1].1)
                .map(str::trim)
                .unwrap_or_default();
            if !window.is_empty() {
                chunks.push(window.to_string());
            }
            if end == offsets.len() {
                break;
            }
            start += step;
        }
        Ok(chunks)
    }
}
