//! Inbound routes: streaming chat, direct suggestion, health

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::Json,
    routing::{get, post},
    Router,
};
use futures::stream;
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;

use utslipp::agent::{ActivitySubmission, AgentContext, AgentEvent, Orchestrator};
use utslipp::llm::ChatMessage;
use utslipp::{ClimatiqError, DirectEstimator};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub estimator: Arc<DirectEstimator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/suggest", post(suggest))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    submitted_activity: ActivitySubmission,
}

/// Run one agent turn and stream its lifecycle events back as SSE. Each
/// request owns its conversation state; dropping the connection abandons
/// the turn and discards in-flight results.
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<serde_json::Value>)>
{
    let ctx = AgentContext::for_submission(&request.submitted_activity)
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        })?
        .with_history(request.messages);

    tracing::info!(session = %ctx.session_id, activity = %ctx.activity, "chat turn started");

    let (tx, rx) = mpsc::channel::<AgentEvent>(256);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(&ctx, tx.clone()).await {
            tracing::error!(error = %e, "agent turn failed");
            let _ = tx.send(AgentEvent::Error { message: e.to_string() }).await;
        }
    });

    let stream = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let sse = match Event::default().json_data(&event) {
            Ok(sse) => sse,
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Some((Ok::<_, Infallible>(sse), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
struct SuggestRequest {
    activity: String,
    measurement: utslipp::RawMeasurement,
}

/// Direct estimation: validate, convert, one upstream call, forward the raw
/// payload (which may itself be an upstream error body).
async fn suggest(
    State(state): State<AppState>,
    Json(request): Json<SuggestRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state
        .estimator
        .estimate(&request.activity, &request.measurement)
        .await
    {
        Ok(payload) => Ok(Json(payload)),
        Err(e @ ClimatiqError::InvalidMeasurement(_)) => Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": e.to_string() })),
        )),
        Err(e) => {
            tracing::error!(error = %e, "direct estimation failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": e.to_string() })),
            ))
        }
    }
}
