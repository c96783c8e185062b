use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Posts are owned by the wider platform; this core reads the
        -- author/status slice and writes back the derived activity fields.
        CREATE TABLE IF NOT EXISTS posts (
            id                  TEXT PRIMARY KEY,
            author_id           TEXT NOT NULL,
            author_name         TEXT,
            post_type           TEXT NOT NULL CHECK (post_type IN ('request', 'offer')),
            status              TEXT NOT NULL DEFAULT 'open',
            participant_count   INTEGER NOT NULL DEFAULT 0,
            last_activity_at    TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_posts_author
            ON posts(author_id);

        CREATE TABLE IF NOT EXISTS profiles (
            user_id         TEXT PRIMARY KEY,
            display_name    TEXT NOT NULL,
            avatar_url      TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS help_offers (
            id              TEXT PRIMARY KEY,
            post_id         TEXT NOT NULL REFERENCES posts(id),
            helper_id       TEXT NOT NULL,
            requester_id    TEXT NOT NULL,
            message         TEXT NOT NULL,
            availability    TEXT,
            contact_method  TEXT,
            skills_offered  TEXT,
            status          TEXT NOT NULL DEFAULT 'pending',
            created_at      TEXT NOT NULL,
            UNIQUE(post_id, helper_id)
        );

        CREATE TABLE IF NOT EXISTS help_requests (
            id              TEXT PRIMARY KEY,
            post_id         TEXT NOT NULL REFERENCES posts(id),
            helper_id       TEXT NOT NULL,
            requester_id    TEXT NOT NULL,
            message         TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            created_at      TEXT NOT NULL,
            UNIQUE(post_id, requester_id)
        );

        -- One conversation per (post, helper, requester). The constraint
        -- closes the race between an existence check and the insert.
        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            post_id         TEXT NOT NULL REFERENCES posts(id),
            helper_id       TEXT NOT NULL,
            requester_id    TEXT NOT NULL,
            last_message    TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE(post_id, helper_id, requester_id)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_post
            ON conversations(post_id);

        CREATE INDEX IF NOT EXISTS idx_conversations_helper
            ON conversations(helper_id, updated_at);

        CREATE INDEX IF NOT EXISTS idx_conversations_requester
            ON conversations(requester_id, updated_at);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL,
            body            TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at, id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
