use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Commands sent FROM client TO server over the chat-list socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatListCommand {
    /// The client opened the conversation with `chat_id`, which names the
    /// other user. The server resolves it to the real chat.
    ActiveChat { chat_id: Uuid },

    /// The client left whatever conversation it had open.
    InactiveChat,
}

/// Events pushed FROM server TO client over the chat-list socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatListEvent {
    NewMessage {
        chat_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: String,
        timestamp: DateTime<Utc>,
        /// Only present in the receiver's copy.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unread_count: Option<i64>,
    },
}

impl ChatListEvent {
    pub fn new_message(message: &Message, unread_count: Option<i64>) -> Self {
        Self::NewMessage {
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content.clone(),
            timestamp: message.timestamp,
            unread_count,
        }
    }
}
