//! Context formatting for answer prompts and terminal output.

use crate::retrieval::ScoredChunk;

/// Format retrieved chunks for the answer prompt.
pub fn format_context_for_prompt(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "---\n[{}] {} ({})\n{}\n---",
                i + 1,
                chunk.title,
                chunk.publish_time.format("%Y-%m-%d"),
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format retrieved chunks for display to the user.
pub fn format_context_for_display(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "{} ({}, score: {:.3})\n  Link: {}",
                chunk.title,
                chunk.publish_time.format("%Y-%m-%d"),
                chunk.score,
                chunk.url()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
