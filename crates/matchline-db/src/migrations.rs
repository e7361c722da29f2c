use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                TEXT PRIMARY KEY,
                name              TEXT NOT NULL DEFAULT '',
                bio               TEXT NOT NULL DEFAULT '',
                age               INTEGER NOT NULL DEFAULT 0,
                gender            TEXT NOT NULL DEFAULT '',
                looking_for       TEXT NOT NULL DEFAULT '',
                interests         TEXT NOT NULL DEFAULT '',
                location          TEXT NOT NULL DEFAULT '',
                profile_picture   TEXT NOT NULL DEFAULT '',
                latitude          REAL,
                longitude         REAL,
                preferred_radius  REAL NOT NULL DEFAULT 0,
                updated_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            -- user_low/user_high hold the pair in canonical order so the
            -- unique index covers both directions.
            CREATE TABLE connections (
                id            TEXT PRIMARY KEY,
                requester_id  TEXT NOT NULL REFERENCES users(id),
                target_id     TEXT NOT NULL REFERENCES users(id),
                user_low      TEXT NOT NULL,
                user_high     TEXT NOT NULL,
                status        TEXT NOT NULL CHECK (status IN ('pending', 'accepted')),
                created_at    TEXT NOT NULL,
                UNIQUE (user_low, user_high)
            );

            CREATE INDEX idx_connections_target ON connections(target_id, status);

            CREATE TABLE declined_users (
                user_id           TEXT NOT NULL REFERENCES users(id),
                declined_user_id  TEXT NOT NULL REFERENCES users(id),
                created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (user_id, declined_user_id)
            );

            CREATE INDEX idx_declined_reverse ON declined_users(declined_user_id);

            CREATE TABLE chats (
                id          TEXT PRIMARY KEY,
                user_low    TEXT NOT NULL REFERENCES users(id),
                user_high   TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL,
                UNIQUE (user_low, user_high)
            );

            CREATE TABLE messages (
                id           TEXT PRIMARY KEY,
                chat_id      TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id    TEXT NOT NULL REFERENCES users(id),
                receiver_id  TEXT NOT NULL REFERENCES users(id),
                content      TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                is_read      INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, created_at);
            CREATE INDEX idx_messages_unread ON messages(chat_id, receiver_id, is_read);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (message timestamp index)");
        conn.execute_batch(
            "
            -- Each insert reads MAX(created_at) across the store.
            CREATE INDEX idx_messages_created ON messages(created_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
