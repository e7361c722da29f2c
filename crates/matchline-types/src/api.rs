use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, User};

// -- Identity --

/// Verified caller identity, supplied by the external auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
}

// -- Messages --

/// Inbound direct message, over the socket or `POST /chats/send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: Message,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub cursor: Option<String>,
}

/// One page of history, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    /// Timestamp of the oldest message in `messages`; empty when the page is.
    #[serde(rename = "nextCursor")]
    pub next_cursor: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub profile_picture: String,
    pub latest_message: Option<String>,
    pub latest_message_timestamp: Option<DateTime<Utc>>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ChatsResponse {
    pub chats: Vec<ChatSummary>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

// -- Recommendations --

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationQuery {
    pub location: Option<String>,
    pub age: Option<String>,
    pub hobbies: Option<String>,
    pub gender: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub score: i64,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<Recommendation>,
}

// -- Connections --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionRequestBody {
    pub receiver_id: Uuid,
}

/// Names a connection request (accept/decline) or a recommended user
/// (recommendation decline).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestIdBody {
    pub request_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisconnectBody {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRequest {
    pub id: Uuid,
    pub sender: UserSummary,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct PendingRequestsResponse {
    pub requests: Vec<PendingRequest>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConnectionEntry {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionEntry>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: String,
}

impl StatusResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

// -- Profiles --

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub profile_picture: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            profile_picture: user.profile_picture.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserBio {
    pub id: Uuid,
    pub age: i32,
    pub gender: String,
    pub location: String,
    pub interests: String,
    pub bio: String,
}

impl From<&User> for UserBio {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            age: user.age,
            gender: user.gender.clone(),
            location: user.location.clone(),
            interests: user.interests.clone(),
            bio: user.bio.clone(),
        }
    }
}
