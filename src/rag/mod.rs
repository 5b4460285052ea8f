//! RAG (Retrieval-Augmented Generation) for question answering over channel
//! transcripts.

pub mod context;
mod response;

pub use context::{format_context_for_display, format_context_for_prompt};
pub use response::{
    AnswerGenerator, OpenAIGenerator, RagAnswer, RagEngine, RagEvent, NO_CONTEXT_ANSWER,
};
