use std::collections::HashSet;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection as SqlConnection, OptionalExtension, params};
use uuid::Uuid;

use matchline_types::models::{
    Chat, Connection, ConnectionStatus, Message, User, canonical_pair, ceil_timestamp,
    format_timestamp, parse_timestamp, truncate_timestamp,
};

use crate::Database;
use crate::models::{
    CHAT_COLUMNS, CONNECTION_COLUMNS, ChatOverview, MESSAGE_COLUMNS, StoredMessage, USER_COLUMNS,
    chat_from_row, connection_from_row, message_from_row, user_from_row, uuid_at,
};

impl Database {
    // -- Users --

    /// Insert or replace a profile. Profiles are owned by the external
    /// profile service; this is its write path.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, bio, age, gender, looking_for, interests, location,
                                    profile_picture, latitude, longitude, preferred_radius)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    bio = excluded.bio,
                    age = excluded.age,
                    gender = excluded.gender,
                    looking_for = excluded.looking_for,
                    interests = excluded.interests,
                    location = excluded.location,
                    profile_picture = excluded.profile_picture,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    preferred_radius = excluded.preferred_radius,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    user.id.to_string(),
                    user.name,
                    user.bio,
                    user.age,
                    user.gender,
                    user.looking_for,
                    user.interests,
                    user.location,
                    user.profile_picture,
                    user.latitude,
                    user.longitude,
                    user.preferred_radius,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
            let rows = stmt
                .query_map([], |row| user_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Connections --

    /// Create a pending request. Returns `None` if the pair already has a
    /// connection row in either direction.
    pub fn create_connection(&self, requester: Uuid, target: Uuid) -> Result<Option<Connection>> {
        let (low, high) = canonical_pair(requester, target);
        let connection = Connection {
            id: Uuid::new_v4(),
            requester_id: requester,
            target_id: target,
            status: ConnectionStatus::Pending,
            created_at: truncate_timestamp(Utc::now()),
        };

        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO connections (id, requester_id, target_id, user_low, user_high, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_low, user_high) DO NOTHING",
                params![
                    connection.id.to_string(),
                    requester.to_string(),
                    target.to_string(),
                    low.to_string(),
                    high.to_string(),
                    connection.status.as_str(),
                    format_timestamp(&connection.created_at),
                ],
            )?;
            Ok((inserted == 1).then_some(connection))
        })
    }

    pub fn get_connection(&self, id: Uuid) -> Result<Option<Connection>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM connections WHERE id = ?1", CONNECTION_COLUMNS),
                    [id.to_string()],
                    connection_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn connection_between(&self, a: Uuid, b: Uuid) -> Result<Option<Connection>> {
        self.with_conn(|conn| query_connection_between(conn, a, b))
    }

    pub fn set_connection_status(&self, id: Uuid, status: ConnectionStatus) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE connections SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id.to_string()],
            )?;
            Ok(updated == 1)
        })
    }

    /// Accept a pending request addressed to `target`. The status check and
    /// the update are one statement, so a request declined or withdrawn in the
    /// meantime yields None instead of a phantom acceptance.
    pub fn accept_connection(&self, id: Uuid, target: Uuid) -> Result<Option<Connection>> {
        self.with_tx(|tx| {
            let updated = tx.execute(
                "UPDATE connections SET status = ?1
                 WHERE id = ?2 AND target_id = ?3 AND status = ?4",
                params![
                    ConnectionStatus::Accepted.as_str(),
                    id.to_string(),
                    target.to_string(),
                    ConnectionStatus::Pending.as_str(),
                ],
            )?;
            if updated == 0 {
                return Ok(None);
            }

            let row = tx
                .query_row(
                    &format!("SELECT {} FROM connections WHERE id = ?1", CONNECTION_COLUMNS),
                    [id.to_string()],
                    connection_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Decline a request: both users stop seeing each other in
    /// recommendations and the request row goes away.
    pub fn decline_connection(&self, connection: &Connection) -> Result<()> {
        self.with_tx(|tx| {
            insert_decline(tx, connection.target_id, connection.requester_id)?;
            insert_decline(tx, connection.requester_id, connection.target_id)?;
            tx.execute(
                "DELETE FROM connections WHERE id = ?1",
                [connection.id.to_string()],
            )?;
            Ok(())
        })
    }

    /// Pending requests addressed to `target`, oldest first, with the requester's profile.
    pub fn pending_requests_for(&self, target: Uuid) -> Result<Vec<(Connection, User)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT c.id, c.requester_id, c.target_id, c.status, c.created_at, {}
                 FROM connections c
                 JOIN users u ON u.id = c.requester_id
                 WHERE c.target_id = ?1 AND c.status = 'pending'
                 ORDER BY c.created_at",
                prefixed(USER_COLUMNS, "u")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([target.to_string()], |row| {
                    Ok((connection_from_row(row)?, user_from_row(row, 5)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Users with an accepted connection to `user`.
    pub fn accepted_partners(&self, user: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| query_partners(conn, user, Some(ConnectionStatus::Accepted)))
    }

    /// Users with any connection row (pending or accepted) involving `user`.
    pub fn related_ids(&self, user: Uuid) -> Result<HashSet<Uuid>> {
        self.with_conn(|conn| Ok(query_partners(conn, user, None)?.into_iter().collect()))
    }

    /// Remove the connection between `a` and `b` along with their chat and
    /// its messages. Returns the id of the deleted chat, if there was one.
    pub fn remove_pair(&self, a: Uuid, b: Uuid) -> Result<Option<Uuid>> {
        let (low, high) = canonical_pair(a, b);
        self.with_tx(|tx| {
            tx.execute(
                "DELETE FROM connections WHERE user_low = ?1 AND user_high = ?2",
                params![low.to_string(), high.to_string()],
            )?;

            let chat = query_chat_by_pair(tx, low, high)?;
            if let Some(chat) = &chat {
                let id = chat.id.to_string();
                tx.execute("DELETE FROM messages WHERE chat_id = ?1", [&id])?;
                tx.execute("DELETE FROM chats WHERE id = ?1", [&id])?;
            }
            Ok(chat.map(|c| c.id))
        })
    }

    // -- Declines --

    /// Record that `user` does not want to see `declined` again. Idempotent.
    pub fn decline_user(&self, user: Uuid, declined: Uuid) -> Result<()> {
        self.with_conn(|conn| insert_decline(conn, user, declined))
    }

    /// Users on either side of a decline involving `user`.
    pub fn declined_ids(&self, user: Uuid) -> Result<HashSet<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT declined_user_id FROM declined_users WHERE user_id = ?1
                 UNION
                 SELECT user_id FROM declined_users WHERE declined_user_id = ?1",
            )?;
            let ids = stmt
                .query_map([user.to_string()], |row| uuid_at(row, 0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Chats --

    pub fn get_chat(&self, id: Uuid) -> Result<Option<Chat>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM chats WHERE id = ?1", CHAT_COLUMNS),
                    [id.to_string()],
                    |row| chat_from_row(row, 0),
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn find_chat(&self, a: Uuid, b: Uuid) -> Result<Option<Chat>> {
        let (low, high) = canonical_pair(a, b);
        self.with_conn(|conn| query_chat_by_pair(conn, low, high))
    }

    pub fn get_or_create_chat(&self, a: Uuid, b: Uuid) -> Result<Chat> {
        self.with_tx(|tx| resolve_chat(tx, a, b))
    }

    /// Every chat `user` takes part in, most recent activity first.
    pub fn chats_for_user(&self, user: Uuid) -> Result<Vec<ChatOverview>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT c.id, c.user_low, c.user_high, c.created_at, {}
                 FROM chats c
                 JOIN users u
                   ON u.id = CASE WHEN c.user_low = ?1 THEN c.user_high ELSE c.user_low END
                 WHERE c.user_low = ?1 OR c.user_high = ?1",
                prefixed(USER_COLUMNS, "u")
            );
            let mut stmt = conn.prepare(&sql)?;
            let pairs = stmt
                .query_map([user.to_string()], |row| {
                    Ok((chat_from_row(row, 0)?, user_from_row(row, 4)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut overviews = Vec::with_capacity(pairs.len());
            for (chat, other) in pairs {
                let latest = query_messages(conn, chat.id, None, 1)?.into_iter().next();
                let unread_count = count_unread(conn, chat.id, user)?;
                overviews.push(ChatOverview {
                    chat,
                    other,
                    latest,
                    unread_count,
                });
            }

            overviews.sort_by(|a, b| {
                let a_at = a.latest.as_ref().map_or(a.chat.created_at, |m| m.timestamp);
                let b_at = b.latest.as_ref().map_or(b.chat.created_at, |m| m.timestamp);
                b_at.cmp(&a_at).then_with(|| a.chat.id.cmp(&b.chat.id))
            });
            Ok(overviews)
        })
    }

    // -- Messages --

    /// Persist a message from `sender` to `receiver`, creating their chat on
    /// first contact. Returns None, and writes nothing, unless the two hold an
    /// accepted connection at the moment of the write.
    ///
    /// `receiver_viewing` is the chat the receiver currently has open. When
    /// it is this chat, the new message and every earlier unread message to
    /// the receiver are marked read in the same transaction.
    pub fn store_message(
        &self,
        sender: Uuid,
        receiver: Uuid,
        content: &str,
        receiver_viewing: Option<Uuid>,
    ) -> Result<Option<StoredMessage>> {
        self.with_tx(|tx| {
            match query_connection_between(tx, sender, receiver)? {
                Some(c) if c.status == ConnectionStatus::Accepted => {}
                _ => return Ok(None),
            }

            let chat = resolve_chat(tx, sender, receiver)?;
            let timestamp = next_message_timestamp(tx)?;
            let id = Uuid::new_v4();

            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, receiver_id, content, created_at, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![
                    id.to_string(),
                    chat.id.to_string(),
                    sender.to_string(),
                    receiver.to_string(),
                    content,
                    format_timestamp(&timestamp),
                ],
            )?;

            let is_read = receiver_viewing == Some(chat.id);
            if is_read {
                mark_read(tx, chat.id, receiver)?;
            }
            let unread_count = count_unread(tx, chat.id, receiver)?;

            Ok(Some(StoredMessage {
                message: Message {
                    id,
                    chat_id: chat.id,
                    sender_id: sender,
                    receiver_id: receiver,
                    content: content.to_string(),
                    timestamp,
                    is_read,
                },
                unread_count,
            }))
        })
    }

    /// Up to `limit` messages of `chat`, newest first, strictly older than
    /// `before` when given.
    pub fn message_page(
        &self,
        chat: Uuid,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| query_messages(conn, chat, before, limit))
    }

    /// Mark every message in `chat` addressed to `receiver` as read.
    /// Returns how many flipped.
    pub fn mark_chat_read(&self, chat: Uuid, receiver: Uuid) -> Result<usize> {
        self.with_conn(|conn| mark_read(conn, chat, receiver))
    }

    pub fn unread_count(&self, chat: Uuid, receiver: Uuid) -> Result<i64> {
        self.with_conn(|conn| count_unread(conn, chat, receiver))
    }
}

fn prefixed(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn query_user(conn: &SqlConnection, id: Uuid) -> Result<Option<User>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            [id.to_string()],
            |row| user_from_row(row, 0),
        )
        .optional()?;
    Ok(row)
}

fn query_connection_between(conn: &SqlConnection, a: Uuid, b: Uuid) -> Result<Option<Connection>> {
    let (low, high) = canonical_pair(a, b);
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM connections WHERE user_low = ?1 AND user_high = ?2",
                CONNECTION_COLUMNS
            ),
            params![low.to_string(), high.to_string()],
            connection_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_partners(
    conn: &SqlConnection,
    user: Uuid,
    status: Option<ConnectionStatus>,
) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT CASE WHEN requester_id = ?1 THEN target_id ELSE requester_id END
         FROM connections
         WHERE (requester_id = ?1 OR target_id = ?1)
           AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at",
    )?;
    let ids = stmt
        .query_map(
            params![user.to_string(), status.map(|s| s.as_str())],
            |row| uuid_at(row, 0),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn insert_decline(conn: &SqlConnection, user: Uuid, declined: Uuid) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO declined_users (user_id, declined_user_id) VALUES (?1, ?2)",
        params![user.to_string(), declined.to_string()],
    )?;
    Ok(())
}

fn query_chat_by_pair(conn: &SqlConnection, low: Uuid, high: Uuid) -> Result<Option<Chat>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM chats WHERE user_low = ?1 AND user_high = ?2",
                CHAT_COLUMNS
            ),
            params![low.to_string(), high.to_string()],
            |row| chat_from_row(row, 0),
        )
        .optional()?;
    Ok(row)
}

/// Lookup-or-create keyed by the canonical pair. A concurrent creator loses
/// the insert race and reads the winner's row.
fn resolve_chat(conn: &SqlConnection, a: Uuid, b: Uuid) -> Result<Chat> {
    let (low, high) = canonical_pair(a, b);
    let created_at = truncate_timestamp(Utc::now());

    conn.execute(
        "INSERT INTO chats (id, user_low, user_high, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_low, user_high) DO NOTHING",
        params![
            Uuid::new_v4().to_string(),
            low.to_string(),
            high.to_string(),
            format_timestamp(&created_at),
        ],
    )?;

    query_chat_by_pair(conn, low, high)?
        .ok_or_else(|| anyhow!("chat for {} / {} vanished after insert", low, high))
}

/// Message timestamps double as pagination cursors, so they must be unique
/// and strictly increasing.
fn next_message_timestamp(conn: &SqlConnection) -> Result<DateTime<Utc>> {
    let now = truncate_timestamp(Utc::now());
    let last: Option<String> =
        conn.query_row("SELECT MAX(created_at) FROM messages", [], |r| r.get(0))?;

    let floor = last
        .as_deref()
        .and_then(parse_timestamp)
        .map(|ts| ts + Duration::microseconds(1));

    Ok(match floor {
        Some(floor) if floor > now => floor,
        _ => now,
    })
}

fn query_messages(
    conn: &SqlConnection,
    chat: Uuid,
    before: Option<DateTime<Utc>>,
    limit: u32,
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM messages
         WHERE chat_id = ?1 AND (?2 IS NULL OR created_at < ?2)
         ORDER BY created_at DESC
         LIMIT ?3",
        MESSAGE_COLUMNS
    ))?;

    let rows = stmt
        .query_map(
            params![
                chat.to_string(),
                before.map(ceil_timestamp).as_ref().map(format_timestamp),
                limit
            ],
            |row| message_from_row(row, 0),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn mark_read(conn: &SqlConnection, chat: Uuid, receiver: Uuid) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE messages SET is_read = 1
         WHERE chat_id = ?1 AND receiver_id = ?2 AND is_read = 0",
        params![chat.to_string(), receiver.to_string()],
    )?;
    Ok(updated)
}

fn count_unread(conn: &SqlConnection, chat: Uuid, receiver: Uuid) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE chat_id = ?1 AND receiver_id = ?2 AND is_read = 0",
        params![chat.to_string(), receiver.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            bio: format!("{} here", name),
            age: 30,
            interests: "hiking".into(),
            location: "Tallinn".into(),
            ..Default::default()
        }
    }

    fn setup(names: &[&str]) -> (Database, Vec<User>) {
        let db = Database::open_in_memory().unwrap();
        let users: Vec<User> = names.iter().map(|n| user(n)).collect();
        for u in &users {
            db.upsert_user(u).unwrap();
        }
        (db, users)
    }

    fn connect(db: &Database, a: Uuid, b: Uuid) {
        let conn = db.create_connection(a, b).unwrap().unwrap();
        assert!(db.set_connection_status(conn.id, ConnectionStatus::Accepted).unwrap());
    }

    #[test]
    fn upsert_replaces_profile() {
        let (db, mut users) = setup(&["ada"]);
        users[0].latitude = Some(59.43);
        users[0].longitude = Some(24.75);
        users[0].age = 31;
        db.upsert_user(&users[0]).unwrap();

        let stored = db.get_user(users[0].id).unwrap().unwrap();
        assert_eq!(stored, users[0]);
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn chat_is_unique_per_unordered_pair() {
        let (db, users) = setup(&["a", "b"]);
        let first = db.get_or_create_chat(users[0].id, users[1].id).unwrap();
        let second = db.get_or_create_chat(users[1].id, users[0].id).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(db.find_chat(users[1].id, users[0].id).unwrap().unwrap().id, first.id);
    }

    #[test]
    fn concurrent_first_messages_share_one_chat() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (users[0].id, users[1].id);
        connect(&db, a, b);
        let db = Arc::new(db);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                std::thread::spawn(move || {
                    let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
                    db.store_message(from, to, &format!("msg {}", i), None).unwrap().unwrap()
                })
            })
            .collect();

        let chat_ids: HashSet<Uuid> = handles
            .into_iter()
            .map(|h| h.join().unwrap().message.chat_id)
            .collect();
        assert_eq!(chat_ids.len(), 1);

        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM chats", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn message_timestamps_strictly_increase() {
        let (db, users) = setup(&["a", "b"]);
        connect(&db, users[0].id, users[1].id);
        let mut last = None;
        for i in 0..50 {
            let stored = db
                .store_message(users[0].id, users[1].id, &i.to_string(), None)
                .unwrap()
                .unwrap();
            if let Some(prev) = last {
                assert!(stored.message.timestamp > prev);
            }
            last = Some(stored.message.timestamp);
        }
    }

    #[test]
    fn viewing_receiver_gets_messages_marked_read() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (users[0].id, users[1].id);
        connect(&db, a, b);

        let first = db.store_message(a, b, "one", None).unwrap().unwrap();
        let second = db.store_message(a, b, "two", None).unwrap().unwrap();
        assert!(!second.message.is_read);
        assert_eq!(second.unread_count, 2);

        let chat_id = first.message.chat_id;
        let third = db.store_message(a, b, "three", Some(chat_id)).unwrap().unwrap();
        assert!(third.message.is_read);
        assert_eq!(third.unread_count, 0);

        let page = db.message_page(chat_id, None, 20).unwrap();
        assert!(page.iter().all(|m| m.is_read));
    }

    #[test]
    fn viewing_another_chat_leaves_message_unread() {
        let (db, users) = setup(&["a", "b", "c"]);
        connect(&db, users[0].id, users[1].id);
        let other_chat = db.get_or_create_chat(users[1].id, users[2].id).unwrap();
        let stored = db
            .store_message(users[0].id, users[1].id, "hi", Some(other_chat.id))
            .unwrap()
            .unwrap();
        assert!(!stored.message.is_read);
        assert_eq!(stored.unread_count, 1);
    }

    #[test]
    fn mark_chat_read_only_touches_receiver() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (users[0].id, users[1].id);
        connect(&db, a, b);
        let chat = db.store_message(a, b, "to b", None).unwrap().unwrap().message.chat_id;
        db.store_message(b, a, "to a", None).unwrap().unwrap();

        assert_eq!(db.mark_chat_read(chat, b).unwrap(), 1);
        assert_eq!(db.unread_count(chat, b).unwrap(), 0);
        assert_eq!(db.unread_count(chat, a).unwrap(), 1);
    }

    #[test]
    fn message_page_walks_backwards() {
        let (db, users) = setup(&["a", "b"]);
        connect(&db, users[0].id, users[1].id);
        let mut sent = Vec::new();
        for i in 0..5 {
            sent.push(
                db.store_message(users[0].id, users[1].id, &i.to_string(), None)
                    .unwrap()
                    .unwrap()
                    .message,
            );
        }
        let chat = sent[0].chat_id;

        let newest = db.message_page(chat, None, 2).unwrap();
        assert_eq!(newest, vec![sent[4].clone(), sent[3].clone()]);

        let older = db.message_page(chat, Some(sent[3].timestamp), 10).unwrap();
        assert_eq!(older, vec![sent[2].clone(), sent[1].clone(), sent[0].clone()]);
    }

    #[test]
    fn one_connection_row_per_pair() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (users[0].id, users[1].id);

        let created = db.create_connection(a, b).unwrap();
        assert!(created.is_some());
        assert!(db.create_connection(b, a).unwrap().is_none());
        assert!(db.create_connection(a, b).unwrap().is_none());

        let conn = db.connection_between(b, a).unwrap().unwrap();
        assert_eq!(conn.requester_id, a);
        assert_eq!(conn.status, ConnectionStatus::Pending);
    }

    #[test]
    fn partners_filtered_by_status() {
        let (db, users) = setup(&["a", "b", "c"]);
        let (a, b, c) = (users[0].id, users[1].id, users[2].id);
        let ab = db.create_connection(a, b).unwrap().unwrap();
        db.create_connection(c, a).unwrap().unwrap();
        assert!(db.set_connection_status(ab.id, ConnectionStatus::Accepted).unwrap());

        assert_eq!(db.accepted_partners(a).unwrap(), vec![b]);
        assert_eq!(db.accepted_partners(b).unwrap(), vec![a]);
        assert_eq!(db.related_ids(a).unwrap(), HashSet::from([b, c]));

        let pending = db.pending_requests_for(a).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.id, c);
    }

    #[test]
    fn declining_request_records_both_directions() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (users[0].id, users[1].id);
        let conn = db.create_connection(a, b).unwrap().unwrap();

        db.decline_connection(&conn).unwrap();
        assert!(db.get_connection(conn.id).unwrap().is_none());
        assert_eq!(db.declined_ids(a).unwrap(), HashSet::from([b]));
        assert_eq!(db.declined_ids(b).unwrap(), HashSet::from([a]));

        // duplicate declines are absorbed
        db.decline_user(a, b).unwrap();
    }

    #[test]
    fn remove_pair_drops_chat_and_messages() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (users[0].id, users[1].id);
        connect(&db, a, b);
        let chat = db.store_message(a, b, "bye", None).unwrap().unwrap().message.chat_id;

        assert_eq!(db.remove_pair(b, a).unwrap(), Some(chat));
        assert!(db.connection_between(a, b).unwrap().is_none());
        assert!(db.get_chat(chat).unwrap().is_none());
        assert!(db.message_page(chat, None, 20).unwrap().is_empty());
        assert_eq!(db.remove_pair(a, b).unwrap(), None);
    }

    #[test]
    fn chat_list_orders_by_latest_activity() {
        let (db, users) = setup(&["me", "x", "y"]);
        let (me, x, y) = (users[0].id, users[1].id, users[2].id);
        connect(&db, x, me);
        connect(&db, me, y);
        db.store_message(x, me, "from x", None).unwrap().unwrap();
        db.store_message(y, me, "from y", None).unwrap().unwrap();
        db.store_message(me, y, "reply y", None).unwrap().unwrap();

        let chats = db.chats_for_user(me).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].other.id, y);
        assert_eq!(chats[0].latest.as_ref().unwrap().content, "reply y");
        assert_eq!(chats[0].unread_count, 1);
        assert_eq!(chats[1].other.id, x);
        assert_eq!(chats[1].unread_count, 1);
    }

    #[test]
    fn message_needs_accepted_connection_at_write_time() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (users[0].id, users[1].id);
        assert!(db.store_message(a, b, "hello?", None).unwrap().is_none());

        let pending = db.create_connection(a, b).unwrap().unwrap();
        assert!(db.store_message(a, b, "hello?", None).unwrap().is_none());
        assert!(db.find_chat(a, b).unwrap().is_none());

        assert!(db.set_connection_status(pending.id, ConnectionStatus::Accepted).unwrap());
        let chat = db.store_message(a, b, "hi", None).unwrap().unwrap().message.chat_id;

        db.remove_pair(a, b).unwrap();
        assert!(db.store_message(b, a, "still there?", None).unwrap().is_none());
        assert!(db.find_chat(a, b).unwrap().is_none());
        assert!(db.message_page(chat, None, 20).unwrap().is_empty());
    }

    #[test]
    fn accept_only_flips_pending_requests_to_their_target() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (users[0].id, users[1].id);
        let request = db.create_connection(a, b).unwrap().unwrap();

        assert!(db.accept_connection(request.id, a).unwrap().is_none());
        let accepted = db.accept_connection(request.id, b).unwrap().unwrap();
        assert_eq!(accepted.status, ConnectionStatus::Accepted);
        assert!(db.accept_connection(request.id, b).unwrap().is_none());
    }

    #[test]
    fn accept_after_decline_changes_nothing() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (users[0].id, users[1].id);
        let request = db.create_connection(a, b).unwrap().unwrap();

        db.decline_connection(&request).unwrap();
        assert!(db.accept_connection(request.id, b).unwrap().is_none());
        assert!(db.connection_between(a, b).unwrap().is_none());
    }

    #[test]
    fn sub_microsecond_cursor_keeps_message_at_same_microsecond() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (users[0].id, users[1].id);
        connect(&db, a, b);
        let stored = db.store_message(a, b, "edge", None).unwrap().unwrap().message;

        let cursor = stored.timestamp + Duration::nanoseconds(789);
        let page = db.message_page(stored.chat_id, Some(cursor), 20).unwrap();
        assert_eq!(page, vec![stored.clone()]);

        let page = db.message_page(stored.chat_id, Some(stored.timestamp), 20).unwrap();
        assert!(page.is_empty());
    }
}
