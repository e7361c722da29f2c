use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use matchline_gateway::run_blocking;
use matchline_types::CoreError;
use matchline_types::api::{
    ChatSummary, ChatsResponse, HistoryPage, HistoryQuery, Identity, MarkReadResponse,
    SendMessageRequest, SendMessageResponse,
};
use matchline_types::models::{ConnectionStatus, format_timestamp, parse_timestamp};

use crate::error::{ApiResult, json_body};
use crate::state::AppState;

pub const HISTORY_PAGE_SIZE: u32 = 20;

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let overviews = run_blocking(move || Ok(db.chats_for_user(identity.user_id)?)).await?;

    let chats = overviews
        .into_iter()
        .map(|o| ChatSummary {
            id: o.chat.id,
            user_id: o.other.id,
            name: o.other.name,
            profile_picture: o.other.profile_picture,
            latest_message_timestamp: o.latest.as_ref().map(|m| m.timestamp),
            latest_message: o.latest.map(|m| m.content),
            unread_count: o.unread_count,
        })
        .collect();

    Ok(Json(ChatsResponse { chats }))
}

/// One page of the caller's conversation with `other_user`, oldest first.
/// `cursor` walks backwards through older history.
pub async fn history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(other_user): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let before = match query.cursor.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            parse_timestamp(raw).ok_or_else(|| CoreError::bad_request(format!("invalid cursor '{}'", raw)))?,
        ),
    };

    let db = state.db.clone();
    let user = identity.user_id;
    let mut messages = run_blocking(move || {
        match db.connection_between(user, other_user)? {
            Some(c) if c.status == ConnectionStatus::Accepted => {}
            _ => return Err(CoreError::forbidden("users are not connected")),
        }
        let chat = db
            .find_chat(user, other_user)?
            .ok_or_else(|| CoreError::not_found("chat not found"))?;
        Ok(db.message_page(chat.id, before, HISTORY_PAGE_SIZE)?)
    })
    .await?;

    messages.reverse();
    let next_cursor = messages
        .first()
        .map(|m| format_timestamp(&m.timestamp))
        .unwrap_or_default();

    Ok(Json(HistoryPage { messages, next_cursor }))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = json_body(payload)?;
    let message = state
        .relay
        .deliver(identity.user_id, req.receiver_id, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(SendMessageResponse { message })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let user = identity.user_id;
    let updated = run_blocking(move || {
        let chat = db
            .get_chat(chat_id)?
            .ok_or_else(|| CoreError::not_found("chat not found"))?;
        if !chat.involves(user) {
            return Err(CoreError::forbidden("not a participant of this chat"));
        }
        Ok(db.mark_chat_read(chat.id, user)?)
    })
    .await?;

    Ok(Json(MarkReadResponse { updated }))
}
