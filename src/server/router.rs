//! HTTP routes: the OpenAI-compatible surface plus a health probe.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::orchestrator::{ChatRequest, ResponseChunk, ResponseOrchestrator};
use crate::prompt;
use crate::server::protocol::{self, CompletionRequest};
use crate::server::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/models", get(models_handler))
        .route("/chat/completions", post(completions_handler))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let available = state.tracker.driver_available();
    let status = if available {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if available { "ok" } else { "driver_unavailable" },
            "session_epoch": state.tracker.session_epoch(),
            "current_generation": state.tracker.current_generation(),
        })),
    )
}

async fn models_handler(State(state): State<AppState>) -> impl IntoResponse {
    if !state.tracker.driver_available() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))).into_response();
    }
    Json(protocol::model_list()).into_response()
}

async fn completions_handler(
    State(state): State<AppState>,
    Json(payload): Json<CompletionRequest>,
) -> impl IntoResponse {
    if !state.tracker.driver_available() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))).into_response();
    }

    let Some(flattened) = prompt::flatten(&payload) else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))).into_response();
    };

    let request = ChatRequest {
        prompt: flattened.text,
        streaming: payload.stream,
        // Config defaults can force a mode on regardless of request markers.
        deepthink: flattened.deepthink || state.defaults.deepthink,
        search: flattened.search || state.defaults.search,
        file_delivery: state.defaults.text_file_delivery,
    };
    let streaming = request.streaming;

    let generation = state.tracker.begin_generation();
    info!(target: "server", generation, streaming, "chat completion accepted");

    let (tx, rx) = mpsc::channel::<ResponseChunk>(32);
    let orchestrator = ResponseOrchestrator::new(
        state.driver.clone(),
        state.tracker.clone(),
        state.orchestrator.clone(),
    );
    tokio::spawn(async move {
        orchestrator.run(request, generation, tx).await;
    });

    if streaming {
        // The producer ends the channel after its single terminal chunk;
        // a closing [DONE] event follows it, once.
        let events = ReceiverStream::new(rx)
            .map(|chunk| {
                Ok::<Event, Infallible>(
                    Event::default().data(protocol::chunk_body(&chunk.content).to_string()),
                )
            })
            .chain(stream::once(async {
                Ok(Event::default().data("[DONE]"))
            }));
        Sse::new(events).into_response()
    } else {
        let mut rx = rx;
        let mut body = String::new();
        while let Some(chunk) = rx.recv().await {
            body.push_str(&chunk.content);
        }
        Json(protocol::completion_body(&body)).into_response()
    }
}
