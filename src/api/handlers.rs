//! HTTP request handlers

use super::types::{
    ChatRequest, CreatePollRequest, ErrorResponse, IngestResponse, NewOptionRequest,
    PollResponse, PublishedReferenceRequest, ReferenceResponse, ReferencesResponse, TextRequest,
};
use super::webhook::{dispatch_update, WebhookReply};
use super::AppState;
use crate::db::ReferenceKind;
use crate::runtime::{HandleOutcome, ReferenceStore, RuntimeError};
use crate::transport::telegram::Update;
use crate::transport::{OutgoingMessage, TelegramClient, TransportError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Telegram delivers updates here
        .route("/telegram/webhook", post(telegram_webhook))
        // Poll creation
        .route("/api/polls", post(create_poll))
        .route("/api/polls/:id", get(get_poll))
        // Conversation input
        .route("/api/polls/:id/text", post(send_text))
        .route("/api/polls/:id/done", post(finish_options))
        .route("/api/polls/:id/new-option", post(begin_new_option))
        // Direct option ingestion, bypassing the conversation
        .route("/api/polls/:id/options", post(ingest_options))
        // Message references
        .route(
            "/api/polls/:id/references",
            get(list_references).post(add_published_reference),
        )
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Telegram Webhook
// ============================================================

/// Always answers 200 so Telegram does not redeliver the update
async fn telegram_webhook(State(state): State<AppState>, Json(update): Json<Update>) -> StatusCode {
    let update_id = update.update_id;

    let reply = match dispatch_update(&state.runtime, update).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(update_id, error = %e, "Failed to handle update");
            return StatusCode::OK;
        }
    };

    if let Err(e) = deliver_reply(state.runtime.transport(), reply).await {
        tracing::warn!(update_id, error = %e, "Failed to deliver reply");
    }
    StatusCode::OK
}

async fn deliver_reply(client: &TelegramClient, reply: WebhookReply) -> Result<(), TransportError> {
    match reply {
        WebhookReply::None => Ok(()),
        WebhookReply::Message { chat_id, text } => client
            .send_message(chat_id, &OutgoingMessage::plain(text))
            .await
            .map(|_| ()),
        WebhookReply::AnswerCallback { id, text } => {
            client.answer_callback_query(&id, text.as_deref()).await
        }
    }
}

// ============================================================
// Polls
// ============================================================

async fn create_poll(
    State(state): State<AppState>,
    Json(req): Json<CreatePollRequest>,
) -> Result<Json<PollResponse>, AppError> {
    let poll = state
        .runtime
        .start_poll(req.user_id, req.chat_id, req.vote_type)
        .await?;
    Ok(Json(PollResponse { poll }))
}

async fn get_poll(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PollResponse>, AppError> {
    let poll = state.runtime.poll(id).await?;
    Ok(Json(PollResponse { poll }))
}

async fn send_text(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<TextRequest>,
) -> Result<Json<HandleOutcome>, AppError> {
    let outcome = state.runtime.handle_text(id, req.chat_id, &req.text).await?;
    Ok(Json(outcome))
}

async fn finish_options(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<HandleOutcome>, AppError> {
    let outcome = state.runtime.finish_options(id, req.chat_id).await?;
    Ok(Json(outcome))
}

async fn begin_new_option(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<NewOptionRequest>,
) -> Result<Json<HandleOutcome>, AppError> {
    let outcome = state
        .runtime
        .begin_new_option(req.user_id, id, req.chat_id)
        .await?;
    Ok(Json(outcome))
}

async fn ingest_options(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<TextRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let added = state
        .runtime
        .ingest_options_now(id, req.chat_id, &req.text)
        .await?;
    Ok(Json(IngestResponse { added }))
}

// ============================================================
// References
// ============================================================

async fn list_references(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReferencesResponse>, AppError> {
    let references = state.runtime.references(id).await?;
    Ok(Json(ReferencesResponse { references }))
}

async fn add_published_reference(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<PublishedReferenceRequest>,
) -> Result<Json<ReferenceResponse>, AppError> {
    state.runtime.poll(id).await?;
    let reference = state
        .runtime
        .storage()
        .add_reference(id, ReferenceKind::Published, req.chat_id, req.message_id)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(ReferenceResponse { reference }))
}

async fn get_version() -> &'static str {
    concat!("pollsmith ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    NotFound(String),
    Internal(String),
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::PollNotFound(_) => AppError::NotFound(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
