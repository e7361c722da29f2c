use axum::{
    Extension,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};

use matchline_gateway::{SocketKind, session};
use matchline_types::api::Identity;

use crate::state::AppState;

fn upgrade(state: AppState, ws: WebSocketUpgrade, kind: SocketKind, identity: Identity) -> impl IntoResponse {
    let relay = state.relay.clone();
    let write_timeout = state.socket_write_timeout;
    ws.on_upgrade(move |socket| session::run_session(socket, relay, kind, identity.user_id, write_timeout))
}

/// Live direct messages: `{receiver_id, content}` in, full messages out.
pub async fn direct_socket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade(state, ws, SocketKind::Direct, identity)
}

/// Chat-list updates and presence commands.
pub async fn chat_list_socket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade(state, ws, SocketKind::ChatList, identity)
}
