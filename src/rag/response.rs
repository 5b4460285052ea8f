//! Answer generation over retrieved context.

use super::context::format_context_for_prompt;
use crate::config::{Prompts, RagSettings};
use crate::error::{RagtubeError, Result};
use crate::openai::create_client;
use crate::retrieval::{RerankStage, Retriever, ScoredChunk};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Answer returned when retrieval finds nothing to ground an answer on.
pub const NO_CONTEXT_ANSWER: &str = "No relevant context found.";

/// Language model producing an answer from a rendered prompt.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;

    /// Stream the answer as text deltas.
    async fn generate_stream(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<String>>>;
}

/// Chat completions against an OpenAI-compatible server.
pub struct OpenAIGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIGenerator {
    pub fn new(settings: &RagSettings) -> Result<Self> {
        Ok(Self {
            client: create_client(settings.api_base.as_deref())?,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    fn request(&self, system: &str, prompt: &str, stream: bool) -> Result<CreateChatCompletionRequest> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()
                .map_err(|e| RagtubeError::Rag(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()
                .map_err(|e| RagtubeError::Rag(e.to_string()))?
                .into(),
        ];

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .stream(stream)
            .build()
            .map_err(|e| RagtubeError::Rag(e.to_string()))
    }
}

#[async_trait]
impl AnswerGenerator for OpenAIGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let request = self.request(system, prompt, false)?;
        let response = self.client.chat().create(request).await.map_err(|e| {
            RagtubeError::OpenAI(format!("Failed to generate response: {}", e))
        })?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| RagtubeError::Rag("Empty response from LLM".to_string()))
    }

    async fn generate_stream(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let request = self.request(system, prompt, true)?;
        let stream = self.client.chat().create_stream(request).await.map_err(|e| {
            RagtubeError::OpenAI(format!("Failed to start response stream: {}", e))
        })?;

        Ok(stream
            .map(|chunk| {
                chunk
                    .map(|response| {
                        response
                            .choices
                            .first()
                            .and_then(|c| c.delta.content.clone())
                            .unwrap_or_default()
                    })
                    .map_err(|e| RagtubeError::OpenAI(format!("Response stream failed: {}", e)))
            })
            .boxed())
    }
}

/// An answer with the context it was generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub context: Vec<ScoredChunk>,
}

/// Event of a streamed answer: the context first, then answer deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RagEvent {
    Context(Vec<ScoredChunk>),
    AnswerDelta(String),
}

/// Retrieval-augmented question answering.
pub struct RagEngine {
    retriever: Retriever,
    rerank: Option<RerankStage>,
    generator: Arc<dyn AnswerGenerator>,
    prompts: Prompts,
}

impl RagEngine {
    pub fn new(retriever: Retriever, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            retriever,
            rerank: None,
            generator,
            prompts: Prompts::default(),
        }
    }

    pub fn with_rerank(mut self, rerank: RerankStage) -> Self {
        self.rerank = Some(rerank);
        self
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Retrieve and, when configured, re-rank the context for a query.
    pub async fn context(&self, query: &str, channel_id: Option<&str>) -> Result<Vec<ScoredChunk>> {
        let candidates = self.retriever.retrieve(query, channel_id).await?;
        match &self.rerank {
            Some(stage) => stage.rerank(query, candidates).await,
            None => Ok(candidates),
        }
    }

    fn render_prompt(&self, query: &str, context: &[ScoredChunk]) -> String {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), query.to_string());
        vars.insert("context".to_string(), format_context_for_prompt(context));
        self.prompts.render_with_custom(&self.prompts.rag.user, &vars)
    }

    /// Answer a question from the indexed transcripts.
    #[instrument(skip(self))]
    pub async fn answer_query(&self, query: &str, channel_id: Option<&str>) -> Result<RagAnswer> {
        info!("Processing question: {}", query);
        let context = self.context(query, channel_id).await?;
        self.answer_with_context(query, context).await
    }

    /// Answer a question from already retrieved context.
    pub async fn answer_with_context(&self, query: &str, context: Vec<ScoredChunk>) -> Result<RagAnswer> {
        if context.is_empty() {
            return Ok(RagAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                context,
            });
        }

        let prompt = self.render_prompt(query, &context);
        let answer = self.generator.generate(&self.prompts.rag.system, &prompt).await?;

        debug!("Generated answer from {} chunks", context.len());
        Ok(RagAnswer { answer, context })
    }

    /// Answer a question as a stream: one `Context` event followed by
    /// `AnswerDelta` events.
    #[instrument(skip(self))]
    pub async fn answer_stream(
        &self,
        query: &str,
        channel_id: Option<&str>,
    ) -> Result<BoxStream<'static, Result<RagEvent>>> {
        let context = self.context(query, channel_id).await?;
        let head = stream::iter(vec![Ok(RagEvent::Context(context.clone()))]);

        if context.is_empty() {
            let tail = stream::iter(vec![Ok(RagEvent::AnswerDelta(NO_CONTEXT_ANSWER.to_string()))]);
            return Ok(head.chain(tail).boxed());
        }

        let prompt = self.render_prompt(query, &context);
        let deltas = self
            .generator
            .generate_stream(&self.prompts.rag.system, &prompt)
            .await?
            .filter(|delta| futures::future::ready(!matches!(delta, Ok(text) if text.is_empty())))
            .map(|delta| delta.map(RagEvent::AnswerDelta));

        Ok(head.chain(deltas).boxed())
    }
}
