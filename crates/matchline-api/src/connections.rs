use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use matchline_db::Database;
use matchline_gateway::run_blocking;
use matchline_types::CoreError;
use matchline_types::api::{
    ConnectionEntry, ConnectionRequestBody, ConnectionsResponse, DisconnectBody, Identity,
    PendingRequest, PendingRequestsResponse, RequestIdBody, StatusResponse, UserSummary,
};
use matchline_types::models::{Connection, ConnectionStatus};

use crate::error::{ApiResult, json_body};
use crate::state::AppState;

pub async fn send_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<ConnectionRequestBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let sender = identity.user_id;
    let receiver = body.receiver_id;
    if sender == receiver {
        return Err(CoreError::bad_request("cannot connect to yourself").into());
    }

    let db = state.db.clone();
    let connection = run_blocking(move || {
        if db.get_user(receiver)?.is_none() {
            return Err(CoreError::not_found("user not found"));
        }
        db.create_connection(sender, receiver)?
            .ok_or_else(|| CoreError::bad_request("connection already exists"))
    })
    .await?;

    info!("{} requested a connection with {} ({})", sender, receiver, connection.id);
    Ok((StatusCode::CREATED, Json(StatusResponse::new("connection request sent"))))
}

pub async fn pending_requests(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let rows = run_blocking(move || Ok(db.pending_requests_for(identity.user_id)?)).await?;

    let requests = rows
        .iter()
        .map(|(connection, requester)| PendingRequest {
            id: connection.id,
            sender: UserSummary::from(requester),
            status: connection.status.to_string(),
        })
        .collect();

    Ok(Json(PendingRequestsResponse { requests }))
}

/// A pending request that `user` is the target of.
fn incoming_request(db: &Database, user: Uuid, request_id: Uuid) -> Result<Connection, CoreError> {
    let connection = db
        .get_connection(request_id)?
        .ok_or_else(|| CoreError::not_found("connection request not found"))?;
    if connection.target_id != user {
        return Err(CoreError::forbidden("only the recipient can answer a request"));
    }
    if connection.status != ConnectionStatus::Pending {
        return Err(CoreError::bad_request("request is not pending"));
    }
    Ok(connection)
}

pub async fn accept_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<RequestIdBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let db = state.db.clone();
    let user = identity.user_id;
    let connection = run_blocking(move || {
        let request = incoming_request(&db, user, body.request_id)?;
        db.accept_connection(request.id, user)?
            .ok_or_else(|| CoreError::not_found("connection request not found"))
    })
    .await?;

    info!("{} accepted connection {} from {}", user, connection.id, connection.requester_id);
    Ok(Json(StatusResponse::new("connection accepted")))
}

pub async fn decline_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<RequestIdBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let db = state.db.clone();
    let user = identity.user_id;
    run_blocking(move || {
        let connection = incoming_request(&db, user, body.request_id)?;
        Ok(db.decline_connection(&connection)?)
    })
    .await?;

    Ok(Json(StatusResponse::new("connection declined")))
}

pub async fn list_connections(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let partners = run_blocking(move || Ok(db.accepted_partners(identity.user_id)?)).await?;
    let connections = partners.into_iter().map(|id| ConnectionEntry { id }).collect();
    Ok(Json(ConnectionsResponse { connections }))
}

/// Drop the connection with another user, together with the chat between
/// them and all of its messages.
pub async fn disconnect(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<DisconnectBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let user = identity.user_id;
    let other = body.user_id;

    let db = state.db.clone();
    let removed_chat = run_blocking(move || {
        if db.connection_between(user, other)?.is_none() {
            return Err(CoreError::not_found("connection not found"));
        }
        Ok(db.remove_pair(user, other)?)
    })
    .await?;

    if let Some(chat) = removed_chat {
        state.registry().forget_chat(chat).await;
    }
    info!("{} disconnected from {}", user, other);
    Ok(Json(StatusResponse::new("disconnected")))
}
