//! Row mapping between SQLite and the shared domain types.
//!
//! Ids and timestamps are stored as TEXT; a value that fails to parse is
//! surfaced as a conversion error rather than silently defaulted.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use matchline_types::models::{Chat, Connection, Message, User, parse_timestamp};

pub const USER_COLUMNS: &str = "id, name, bio, age, gender, looking_for, interests, location, \
     profile_picture, latitude, longitude, preferred_radius";

pub const CONNECTION_COLUMNS: &str = "id, requester_id, target_id, status, created_at";

pub const CHAT_COLUMNS: &str = "id, user_low, user_high, created_at";

pub const MESSAGE_COLUMNS: &str =
    "id, chat_id, sender_id, receiver_id, content, created_at, is_read";

/// A message as persisted, plus the receiver's unread count for its chat
/// right after the write.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub message: Message,
    pub unread_count: i64,
}

/// One entry of a user's chat list.
#[derive(Debug, Clone)]
pub struct ChatOverview {
    pub chat: Chat,
    pub other: User,
    pub latest: Option<Message>,
    pub unread_count: i64,
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

pub fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| conversion_error(idx, format!("bad uuid '{}': {}", raw, e)))
}

pub fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp '{}'", raw)))
}

/// Expects `USER_COLUMNS` starting at `offset`.
pub fn user_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, offset)?,
        name: row.get(offset + 1)?,
        bio: row.get(offset + 2)?,
        age: row.get(offset + 3)?,
        gender: row.get(offset + 4)?,
        looking_for: row.get(offset + 5)?,
        interests: row.get(offset + 6)?,
        location: row.get(offset + 7)?,
        profile_picture: row.get(offset + 8)?,
        latitude: row.get(offset + 9)?,
        longitude: row.get(offset + 10)?,
        preferred_radius: row.get(offset + 11)?,
    })
}

pub fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<Connection> {
    let status: String = row.get(3)?;
    Ok(Connection {
        id: uuid_at(row, 0)?,
        requester_id: uuid_at(row, 1)?,
        target_id: uuid_at(row, 2)?,
        status: status.parse().map_err(|e| conversion_error(3, e))?,
        created_at: timestamp_at(row, 4)?,
    })
}

pub fn chat_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: uuid_at(row, offset)?,
        user_low: uuid_at(row, offset + 1)?,
        user_high: uuid_at(row, offset + 2)?,
        created_at: timestamp_at(row, offset + 3)?,
    })
}

pub fn message_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_at(row, offset)?,
        chat_id: uuid_at(row, offset + 1)?,
        sender_id: uuid_at(row, offset + 2)?,
        receiver_id: uuid_at(row, offset + 3)?,
        content: row.get(offset + 4)?,
        timestamp: timestamp_at(row, offset + 5)?,
        is_read: row.get(offset + 6)?,
    })
}
