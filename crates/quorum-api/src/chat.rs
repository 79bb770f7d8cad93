use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use quorum_db::queries::chat::DEFAULT_HISTORY_LIMIT;
use quorum_types::api::SendChatRequest;
use quorum_types::events::ChannelEvent;
use quorum_types::models::{ChatMessage, Identity};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: id of the oldest message from the previous page.
    pub before: Option<Uuid>,
}

fn default_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

pub async fn chat_history(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ChatQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let tenant_id = identity.tenant_id.clone();
    let messages = state
        .blocking(move |db| db.chat_history(&tenant_id, session_id, query.limit, query.before))
        .await?;
    Ok(Json(messages))
}

pub async fn send_chat(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .blocking(move |db| db.append_chat(&identity, session_id, &req.content, Utc::now()))
        .await?;

    state.dispatcher.publish(ChannelEvent::Chat { message: message.clone() });
    Ok((StatusCode::CREATED, Json(message)))
}
