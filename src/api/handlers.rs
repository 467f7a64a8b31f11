//! HTTP request handlers

use super::sse::{delta_stream, ChannelSink};
use super::types::{
    ConversationListResponse, CreateConversationRequest, ErrorResponse, HealthResponse, ListQuery,
    StreamRequest, UpdateConversationRequest,
};
use super::AppState;
use crate::agent::Agent;
use crate::db::{ConversationSettings, DbError};
use crate::tools::ToolRegistry;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route(
            "/v1/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/v1/conversations/:conv_id",
            get(get_conversation).patch(patch_conversation),
        )
        // Streaming (session-scoped)
        .route("/v1/stream", post(stream_chat))
        // Streaming (conversation-scoped)
        .route(
            "/v1/conversations/:conv_id/stream",
            post(stream_chat_conversation),
        )
        .with_state(state)
}

// ============================================================
// Health
// ============================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

// ============================================================
// Conversations
// ============================================================

async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ConversationListResponse>, AppError> {
    let conversations = state
        .db
        .list_conversations(query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .map_err(db_error)?;

    let json_convs: Vec<Value> = conversations
        .into_iter()
        .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
        .collect();

    Ok(Json(ConversationListResponse {
        conversations: json_convs,
    }))
}

async fn create_conversation(
    State(state): State<AppState>,
    body: Option<Json<CreateConversationRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let conversation = state
        .db
        .create_conversation(req.title.as_deref(), req.settings)
        .map_err(db_error)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(conversation).unwrap_or(Value::Null)),
    ))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(conv_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let conversation = state.db.get_conversation(&conv_id).map_err(db_error)?;
    Ok(Json(
        serde_json::to_value(conversation).unwrap_or(Value::Null),
    ))
}

async fn patch_conversation(
    State(state): State<AppState>,
    Path(conv_id): Path<String>,
    body: Option<Json<UpdateConversationRequest>>,
) -> Result<Json<Value>, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let conversation = state
        .db
        .update_conversation(&conv_id, req.title.as_deref(), req.settings.as_ref())
        .map_err(db_error)?;

    Ok(Json(
        serde_json::to_value(conversation).unwrap_or(Value::Null),
    ))
}

// ============================================================
// Streaming
// ============================================================

async fn stream_chat(
    State(state): State<AppState>,
    Json(req): Json<StreamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let prompt = req.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("prompt required".to_string()));
    }

    let session_id = match req.session.as_deref().map(str::trim) {
        Some(session) if !session.is_empty() => session.to_string(),
        _ => "default".to_string(),
    };

    stream_round(state, session_id, prompt, None).await
}

async fn stream_chat_conversation(
    State(state): State<AppState>,
    Path(conv_id): Path<String>,
    Json(req): Json<StreamRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 404 before the stream response is stood up.
    state.db.get_conversation(&conv_id).map_err(db_error)?;

    let prompt = req.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("prompt required".to_string()));
    }

    stream_round(state, conv_id.clone(), prompt, Some(conv_id)).await
}

/// Shared invocation driver behind both stream endpoints.
async fn stream_round(
    state: AppState,
    session_id: String,
    prompt: String,
    conv_id: Option<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.api_key_present {
        return Err(AppError::Internal("OPENAI_API_KEY not set".to_string()));
    }

    let agent = session_agent(&state, &session_id, conv_id.as_deref()).await?;
    let (tx, rx) = mpsc::channel(16);

    let db = state.db.clone();
    tokio::spawn(async move {
        let mut sink = ChannelSink::new(tx);
        // Holding the agent lock for the whole invocation keeps turns for
        // one conversation strictly sequential.
        let mut agent = agent.lock().await;
        match agent.invoke(&prompt, &mut sink).await {
            Ok(summary) => {
                if let Some(conv_id) = &conv_id {
                    // Persistence failures must not break the stream.
                    if let Err(e) = db.append_items(conv_id, &summary.new_items) {
                        tracing::warn!(
                            error = %e,
                            conv_id = %conv_id,
                            "Failed to persist conversation items"
                        );
                    }
                }
                sink.finish_with_usage(summary.total_tokens).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Agent invocation failed");
                sink.finish_with_error(&e.to_string()).await;
            }
        }
    });

    Ok(delta_stream(rx))
}

/// Resolve or create the cached agent for a session.
async fn session_agent(
    state: &AppState,
    session_id: &str,
    conv_id: Option<&str>,
) -> Result<Arc<Mutex<Agent>>, AppError> {
    let mut sessions = state.sessions.lock().await;
    if let Some(agent) = sessions.get(session_id) {
        return Ok(agent.clone());
    }

    let (items, settings) = match conv_id {
        Some(id) => {
            let conversation = state.db.get_conversation(id).map_err(db_error)?;
            let items = state.db.items_for_agent(id).map_err(db_error)?;
            (items, conversation.settings)
        }
        None => (Vec::new(), ConversationSettings::default()),
    };

    let registry = Arc::new(
        ToolRegistry::standard().with_allowlist(settings.tool_allowlist.clone()),
    );
    let agent = Arc::new(Mutex::new(Agent::new(
        state.transport.clone(),
        registry,
        settings,
        items,
    )));
    sessions.insert(session_id.to_string(), agent.clone());
    Ok(agent)
}

// ============================================================
// Error handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

fn db_error(e: DbError) -> AppError {
    match e {
        DbError::ConversationNotFound(_) => AppError::NotFound(e.to_string()),
        DbError::Sqlite(_) => AppError::Internal(e.to_string()),
    }
}
