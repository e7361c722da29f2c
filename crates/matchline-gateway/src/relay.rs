use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use matchline_db::{Database, StoredMessage};
use matchline_types::CoreError;
use matchline_types::events::ChatListEvent;
use matchline_types::models::Message;

use crate::registry::{Registry, SocketKind};
use crate::run_blocking;

/// Persists direct messages and fans them out to whichever of the two
/// participants' sockets are live.
#[derive(Clone)]
pub struct Relay {
    db: Arc<Database>,
    registry: Registry,
}

impl Relay {
    pub fn new(db: Arc<Database>, registry: Registry) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Store a message from `sender` to `receiver` and push it live.
    ///
    /// The message is durable once this returns Ok. Push failures only mean
    /// the recipient picks it up from history later.
    pub async fn deliver(&self, sender: Uuid, receiver: Uuid, content: &str) -> Result<Message, CoreError> {
        if sender == receiver {
            return Err(CoreError::bad_request("cannot message yourself"));
        }
        if content.trim().is_empty() {
            return Err(CoreError::bad_request("message content is empty"));
        }

        // Connection status is checked inside the write transaction.
        let receiver_viewing = self.registry.active_chat(receiver).await;
        let db = self.db.clone();
        let content = content.to_string();
        let stored = run_blocking(move || {
            db.store_message(sender, receiver, &content, receiver_viewing)?
                .ok_or_else(|| CoreError::forbidden("users are not connected"))
        })
        .await?;

        debug!(
            message = %stored.message.id,
            chat = %stored.message.chat_id,
            read = stored.message.is_read,
            "Stored message {} -> {}",
            sender,
            receiver
        );

        self.fan_out(&stored).await;
        Ok(stored.message)
    }

    async fn fan_out(&self, stored: &StoredMessage) {
        let message = &stored.message;

        if !self
            .registry
            .push_json(SocketKind::Direct, message.receiver_id, message)
            .await
        {
            debug!("{} has no live direct socket; message left for history", message.receiver_id);
        }

        let for_receiver = ChatListEvent::new_message(message, Some(stored.unread_count));
        if !self
            .registry
            .push_json(SocketKind::ChatList, message.receiver_id, &for_receiver)
            .await
        {
            debug!("{} has no live chat-list socket", message.receiver_id);
        }

        let for_sender = ChatListEvent::new_message(message, None);
        if !self
            .registry
            .push_json(SocketKind::ChatList, message.sender_id, &for_sender)
            .await
        {
            debug!("{} has no live chat-list socket", message.sender_id);
        }
    }

    /// Mark `user` as viewing their conversation with `other_user`. Returns
    /// the chat id, or None when the two have never exchanged a chat.
    pub async fn enter_chat(&self, user: Uuid, other_user: Uuid) -> Result<Option<Uuid>, CoreError> {
        let db = self.db.clone();
        let chat = run_blocking(move || Ok(db.find_chat(user, other_user)?)).await?;

        match chat {
            Some(chat) => {
                self.registry.set_active_chat(user, chat.id).await;
                info!("{} is viewing chat {}", user, chat.id);
                Ok(Some(chat.id))
            }
            None => {
                warn!("{} opened a chat with {} that does not exist yet", user, other_user);
                Ok(None)
            }
        }
    }

    pub async fn leave_chat(&self, user: Uuid) {
        if let Some(chat) = self.registry.clear_active_chat(user).await {
            info!("{} left chat {}", user, chat);
        }
    }
}
