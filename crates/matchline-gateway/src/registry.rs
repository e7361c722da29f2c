use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

/// Frames queued for a socket's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    /// The socket was replaced by a newer one; close it.
    Close,
}

/// The two socket channels a user can hold, at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Direct,
    ChatList,
}

impl SocketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::ChatList => "chat-list",
        }
    }
}

struct SocketHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

/// Live sockets and presence for every online user.
///
/// Lock rule: a method holds at most one of the three maps at a time, and
/// nothing is ever sent on a socket channel while a map lock is held. Handles
/// are cloned out first.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// user_id -> direct-message socket
    direct: RwLock<HashMap<Uuid, SocketHandle>>,

    /// user_id -> chat-list socket
    chat_list: RwLock<HashMap<Uuid, SocketHandle>>,

    /// user_id -> chat the user has open
    presence: RwLock<HashMap<Uuid, Uuid>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                direct: RwLock::new(HashMap::new()),
                chat_list: RwLock::new(HashMap::new()),
                presence: RwLock::new(HashMap::new()),
            }),
        }
    }

    fn sockets(&self, kind: SocketKind) -> &RwLock<HashMap<Uuid, SocketHandle>> {
        match kind {
            SocketKind::Direct => &self.inner.direct,
            SocketKind::ChatList => &self.inner.chat_list,
        }
    }

    /// Register a socket for `user_id`. Returns (conn_id, receiver). A socket
    /// of the same kind already held by the user is told to close.
    pub async fn register(
        &self,
        kind: SocketKind,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<Outbound>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let prior = self
            .sockets(kind)
            .write()
            .await
            .insert(user_id, SocketHandle { conn_id, tx });

        if let Some(prior) = prior {
            info!(
                "{} replaced {} socket {} with {}",
                user_id,
                kind.as_str(),
                prior.conn_id,
                conn_id
            );
            let _ = prior.tx.send(Outbound::Close);
        }

        (conn_id, rx)
    }

    /// Remove the user's socket, but only if `conn_id` still owns the slot.
    /// Dropping the chat-list socket also clears the user's presence.
    pub async fn unregister(&self, kind: SocketKind, user_id: Uuid, conn_id: Uuid) -> bool {
        let removed = {
            let mut sockets = self.sockets(kind).write().await;
            match sockets.get(&user_id) {
                Some(handle) if handle.conn_id == conn_id => sockets.remove(&user_id).is_some(),
                _ => false,
            }
        };

        if removed && kind == SocketKind::ChatList {
            self.clear_active_chat(user_id).await;
        }
        removed
    }

    pub async fn is_online(&self, kind: SocketKind, user_id: Uuid) -> bool {
        self.sockets(kind).read().await.contains_key(&user_id)
    }

    pub async fn socket_count(&self, kind: SocketKind) -> usize {
        self.sockets(kind).read().await.len()
    }

    /// Queue a frame for the user's socket. Returns false if the user has no
    /// socket of that kind or its writer has gone away.
    pub async fn push(&self, kind: SocketKind, user_id: Uuid, frame: Outbound) -> bool {
        let tx = self
            .sockets(kind)
            .read()
            .await
            .get(&user_id)
            .map(|handle| handle.tx.clone());

        match tx {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    pub async fn push_json<T: Serialize>(&self, kind: SocketKind, user_id: Uuid, payload: &T) -> bool {
        match serde_json::to_string(payload) {
            Ok(text) => self.push(kind, user_id, Outbound::Text(text)).await,
            Err(e) => {
                warn!("Failed to encode {} push for {}: {}", kind.as_str(), user_id, e);
                false
            }
        }
    }

    // -- Presence --

    pub async fn set_active_chat(&self, user_id: Uuid, chat_id: Uuid) {
        self.inner.presence.write().await.insert(user_id, chat_id);
    }

    pub async fn clear_active_chat(&self, user_id: Uuid) -> Option<Uuid> {
        self.inner.presence.write().await.remove(&user_id)
    }

    pub async fn active_chat(&self, user_id: Uuid) -> Option<Uuid> {
        self.inner.presence.read().await.get(&user_id).copied()
    }

    /// Forget a chat that no longer exists.
    pub async fn forget_chat(&self, chat_id: Uuid) {
        self.inner
            .presence
            .write()
            .await
            .retain(|_, active| *active != chat_id);
    }
}
