use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::{Sink, SinkExt, StreamExt};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use matchline_types::api::SendMessageRequest;
use matchline_types::events::ChatListCommand;

use crate::registry::{Outbound, SocketKind};
use crate::relay::Relay;

/// Server sends a Ping every 15 seconds. Two missed Pongs (~30s) drop the
/// connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive an upgraded socket of `kind` for `user_id` until either side hangs
/// up. The caller has already verified the user's identity.
pub async fn run_session(
    socket: WebSocket,
    relay: Relay,
    kind: SocketKind,
    user_id: Uuid,
    write_timeout: Duration,
) {
    let (mut sender, mut receiver) = socket.split();
    let registry = relay.registry().clone();
    let (conn_id, mut outbound_rx) = registry.register(kind, user_id).await;

    info!("{} connected {} socket {}", user_id, kind.as_str(), conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(Outbound::Text(text)) => {
                            if !write(&mut sender, Message::Text(text.into()), write_timeout).await {
                                break;
                            }
                        }
                        Some(Outbound::Close) => {
                            let close = Message::Close(Some(CloseFrame {
                                code: close_code::NORMAL,
                                reason: "replaced by a newer connection".into(),
                            }));
                            write(&mut sender, close, write_timeout).await;
                            break;
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if !write(&mut sender, Message::Ping(Vec::new().into()), write_timeout).await {
                        break;
                    }
                }
            }
        }
    });

    let recv_relay = relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("{} {} socket read error: {}", user_id, kind.as_str(), e);
                    break;
                }
            };

            match frame {
                Message::Text(text) => {
                    let flow = match kind {
                        SocketKind::Direct => handle_direct(&recv_relay, user_id, text.as_str()).await,
                        SocketKind::ChatList => handle_chat_list(&recv_relay, user_id, text.as_str()).await,
                    };
                    if flow.is_break() {
                        break;
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(frame) => {
                    match frame.map(|f| f.code) {
                        Some(close_code::NORMAL) | Some(close_code::AWAY) | None => {
                            debug!("{} closed {} socket", user_id, kind.as_str());
                        }
                        Some(code) => {
                            warn!("{} closed {} socket with code {}", user_id, kind.as_str(), code);
                        }
                    }
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.unregister(kind, user_id, conn_id).await;
    info!("{} disconnected {} socket {}", user_id, kind.as_str(), conn_id);
}

/// Returns false when the frame could not be written in time.
async fn write<S>(sender: &mut S, frame: Message, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    match tokio::time::timeout(limit, sender.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("socket write failed: {}", e);
            false
        }
        Err(_) => {
            warn!("socket write timed out after {:?}", limit);
            false
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

/// A malformed payload ends the session. A rejected message does not.
async fn handle_direct(relay: &Relay, user_id: Uuid, text: &str) -> ControlFlow<()> {
    let request = match serde_json::from_str::<SendMessageRequest>(text) {
        Ok(request) => request,
        Err(e) => {
            warn!(
                "{} bad direct message: {} -- raw: {}",
                user_id,
                e,
                preview(text)
            );
            return ControlFlow::Break(());
        }
    };

    if let Err(e) = relay.deliver(user_id, request.receiver_id, &request.content).await {
        warn!("{} -> {} message rejected: {}", user_id, request.receiver_id, e);
    }
    ControlFlow::Continue(())
}

async fn handle_chat_list(relay: &Relay, user_id: Uuid, text: &str) -> ControlFlow<()> {
    let command = match serde_json::from_str::<ChatListCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(
                "{} bad chat-list command: {} -- raw: {}",
                user_id,
                e,
                preview(text)
            );
            return ControlFlow::Break(());
        }
    };

    trace!("{} chat-list command: {:?}", user_id, command);
    match command {
        ChatListCommand::ActiveChat { chat_id: other_user } => {
            if let Err(e) = relay.enter_chat(user_id, other_user).await {
                warn!("{} could not open chat with {}: {}", user_id, other_user, e);
            }
        }
        ChatListCommand::InactiveChat => relay.leave_chat(user_id).await,
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;
    use serde_json::json;

    use matchline_db::Database;
    use matchline_types::models::{ConnectionStatus, User};

    use crate::registry::Registry;

    fn relay_with_pair(connected: bool) -> (Relay, Uuid, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ids: Vec<Uuid> = ["ana", "ben"]
            .iter()
            .map(|name| {
                let user = User {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    ..Default::default()
                };
                db.upsert_user(&user).unwrap();
                user.id
            })
            .collect();
        if connected {
            let conn = db.create_connection(ids[0], ids[1]).unwrap().unwrap();
            db.set_connection_status(conn.id, ConnectionStatus::Accepted).unwrap();
        }
        (Relay::new(db, Registry::new()), ids[0], ids[1])
    }

    fn direct(receiver: Uuid, content: &str) -> String {
        json!({ "receiver_id": receiver, "content": content }).to_string()
    }

    #[tokio::test]
    async fn malformed_payloads_end_both_sessions() {
        let (relay, a, _) = relay_with_pair(true);
        assert!(handle_direct(&relay, a, "not json").await.is_break());
        assert!(handle_direct(&relay, a, r#"{"content":"no receiver"}"#).await.is_break());
        assert!(handle_chat_list(&relay, a, "{}").await.is_break());
        assert!(handle_chat_list(&relay, a, r#"{"type":"teleport"}"#).await.is_break());
    }

    #[tokio::test]
    async fn rejected_messages_keep_session_open() {
        let (relay, a, b) = relay_with_pair(false);
        assert!(handle_direct(&relay, a, &direct(b, "hi")).await.is_continue());
        assert!(relay.db().find_chat(a, b).unwrap().is_none());

        let (relay, a, b) = relay_with_pair(true);
        assert!(handle_direct(&relay, a, &direct(b, "   ")).await.is_continue());
        assert!(handle_direct(&relay, a, &direct(a, "me")).await.is_continue());
        assert!(relay.db().find_chat(a, b).unwrap().is_none());
    }

    #[tokio::test]
    async fn direct_message_is_stored() {
        let (relay, a, b) = relay_with_pair(true);
        assert!(handle_direct(&relay, a, &direct(b, "hello")).await.is_continue());

        let chat = relay.db().find_chat(a, b).unwrap().unwrap();
        let page = relay.db().message_page(chat.id, None, 20).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].content, "hello");
    }

    #[tokio::test]
    async fn active_chat_for_unknown_user_is_ignored() {
        let (relay, a, _) = relay_with_pair(true);
        let command = json!({ "type": "active_chat", "chat_id": Uuid::new_v4() }).to_string();
        assert!(handle_chat_list(&relay, a, &command).await.is_continue());
        assert_eq!(relay.registry().active_chat(a).await, None);
    }

    #[tokio::test]
    async fn presence_follows_chat_list_commands() {
        let (relay, a, b) = relay_with_pair(true);
        let message = relay.deliver(a, b, "hi").await.unwrap();

        let open = json!({ "type": "active_chat", "chat_id": a }).to_string();
        assert!(handle_chat_list(&relay, b, &open).await.is_continue());
        assert_eq!(relay.registry().active_chat(b).await, Some(message.chat_id));

        let close = json!({ "type": "inactive_chat" }).to_string();
        assert!(handle_chat_list(&relay, b, &close).await.is_continue());
        assert_eq!(relay.registry().active_chat(b).await, None);
    }

    #[tokio::test]
    async fn write_reports_failure_and_timeout() {
        let limit = Duration::from_millis(20);

        let mut open = sink::drain::<Message>();
        assert!(write(&mut open, Message::Text("hi".into()), limit).await);

        let mut broken = Box::pin(sink::unfold((), |(), _frame: Message| async {
            Err::<(), _>(std::io::Error::other("peer gone"))
        }));
        assert!(!write(&mut broken, Message::Text("hi".into()), limit).await);

        let mut stalled = Box::pin(sink::unfold((), |(), _frame: Message| {
            std::future::pending::<Result<(), std::io::Error>>()
        }));
        assert!(!write(&mut stalled, Message::Text("hi".into()), limit).await);
    }
}
