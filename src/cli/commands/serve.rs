//! HTTP API server for the answering frontend.
//!
//! Provides the channel listing and RAG endpoints, answered in one JSON
//! document or streamed as server-sent events.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Pipeline;
use crate::rag::{RagAnswer, RagEngine, RagEvent, NO_CONTEXT_ANSWER};
use crate::store::CorpusStore;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

/// Shared application state.
pub struct AppState {
    pub engine: RagEngine,
    pub store: Arc<CorpusStore>,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(settings).await?;
    let engine = pipeline.build_rag_engine().await?;

    let state = Arc::new(AppState {
        engine,
        store: pipeline.store(),
    });

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("ragtube API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Readiness", "GET /readiness");
    Output::kv("Channels", "GET /channel");
    Output::kv("Ask (RAG)", "GET /rag?input=...&channel_id=...");
    Output::kv("Ask (stream)", "GET /rag/stream?input=...&channel_id=...");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// The API routes over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/readiness", get(readiness))
        .route("/channel", get(list_channels))
        .route("/rag", get(rag))
        .route("/rag/stream", get(rag_stream))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct RagQuery {
    input: String,
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// === Handlers ===

async fn readiness() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_channels(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_channels() {
        Ok(channels) => Json(channels).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn rag(State(state): State<Arc<AppState>>, Query(query): Query<RagQuery>) -> impl IntoResponse {
    let channel_id = query.channel_id.as_deref();

    // A failed retrieval reads as an empty context to the user.
    let context = match state.engine.context(&query.input, channel_id).await {
        Ok(context) => context,
        Err(e) => {
            warn!("Retrieval failed for {:?}: {}", query.input, e);
            return Json(RagAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                context: Vec::new(),
            })
            .into_response();
        }
    };

    match state.engine.answer_with_context(&query.input, context).await {
        Ok(answer) => Json(answer).into_response(),
        Err(e) => {
            error!("Answer generation failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn rag_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RagQuery>,
) -> Sse<KeepAliveStream<BoxStream<'static, Result<Event, Infallible>>>> {
    let events = match state
        .engine
        .answer_stream(&query.input, query.channel_id.as_deref())
        .await
    {
        Ok(events) => events,
        Err(e) => {
            warn!("Retrieval failed for {:?}: {}", query.input, e);
            stream::iter(vec![
                Ok(RagEvent::Context(Vec::new())),
                Ok(RagEvent::AnswerDelta(NO_CONTEXT_ANSWER.to_string())),
            ])
            .boxed()
        }
    };

    let sse = events
        .map(|event| {
            let event = match event {
                Ok(event) => Event::default().json_data(&event).unwrap_or_else(|e| {
                    Event::default().event("error").data(e.to_string())
                }),
                Err(e) => Event::default().event("error").data(e.to_string()),
            };
            Ok::<_, Infallible>(event)
        })
        .boxed();

    Sse::new(sse).keep_alive(KeepAlive::default())
}
