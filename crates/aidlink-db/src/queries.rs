use crate::models::{
    ConversationRow, HelpOfferRow, HelpRequestRow, MessageRow, PostRow, ProfileRow,
};
use crate::Database;
use anyhow::{anyhow, Result};
use rusqlite::Connection;

/// Outcome of the conversation-plus-first-message insert. `Existing` covers
/// both the fast path (row found before the insert attempt) and the slow
/// path (unique conflict lost to a concurrent identical request).
pub enum ConversationInsert {
    Created {
        conversation: ConversationRow,
        message: MessageRow,
    },
    Existing {
        conversation: ConversationRow,
        first_message_id: Option<String>,
    },
}

impl Database {
    // -- Posts --

    pub fn create_post(
        &self,
        id: &str,
        author_id: &str,
        author_name: Option<&str>,
        post_type: &str,
        status: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, author_id, author_name, post_type, status) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, author_id, author_name, post_type, status],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| query_post(conn, id))
    }

    /// Write back the derived activity fields. Returns false when the post
    /// no longer exists.
    pub fn update_post_activity(
        &self,
        id: &str,
        participant_count: u32,
        last_activity_at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET participant_count = ?2, last_activity_at = ?3 WHERE id = ?1",
                rusqlite::params![id, participant_count, last_activity_at],
            )?;
            Ok(changed > 0)
        })
    }

    /// Display name denormalized onto any post authored by the user.
    pub fn author_name_from_posts(&self, author_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT author_name FROM posts
                 WHERE author_id = ?1 AND author_name IS NOT NULL
                 ORDER BY created_at DESC LIMIT 1",
                [author_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    // -- Profiles --

    pub fn upsert_profile(
        &self,
        user_id: &str,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (user_id, display_name, avatar_url) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET display_name = ?2, avatar_url = ?3",
                rusqlite::params![user_id, display_name, avatar_url],
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, display_name, avatar_url FROM profiles WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(ProfileRow {
                        user_id: row.get(0)?,
                        display_name: row.get(1)?,
                        avatar_url: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Help offers / requests --

    /// Insert a help offer unless one already exists for (post, helper).
    /// Returns the surviving row and whether this call created it.
    #[allow(clippy::too_many_arguments)]
    pub fn create_help_offer(
        &self,
        id: &str,
        post_id: &str,
        helper_id: &str,
        requester_id: &str,
        message: &str,
        availability: Option<&str>,
        contact_method: Option<&str>,
        skills_offered: Option<&str>,
        created_at: &str,
    ) -> Result<(HelpOfferRow, bool)> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO help_offers
                   (id, post_id, helper_id, requester_id, message,
                    availability, contact_method, skills_offered, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    id,
                    post_id,
                    helper_id,
                    requester_id,
                    message,
                    availability,
                    contact_method,
                    skills_offered,
                    created_at
                ],
            )? > 0;

            let row = conn
                .query_row(
                    "SELECT id, post_id, helper_id, requester_id, message,
                            availability, contact_method, skills_offered, status, created_at
                     FROM help_offers WHERE post_id = ?1 AND helper_id = ?2",
                    [post_id, helper_id],
                    |row| {
                        Ok(HelpOfferRow {
                            id: row.get(0)?,
                            post_id: row.get(1)?,
                            helper_id: row.get(2)?,
                            requester_id: row.get(3)?,
                            message: row.get(4)?,
                            availability: row.get(5)?,
                            contact_method: row.get(6)?,
                            skills_offered: row.get(7)?,
                            status: row.get(8)?,
                            created_at: row.get(9)?,
                        })
                    },
                )
                .optional()?
                .ok_or_else(|| anyhow!("help offer missing after insert"))?;

            Ok((row, inserted))
        })
    }

    /// Insert a help request unless one already exists for (post, requester).
    pub fn create_help_request(
        &self,
        id: &str,
        post_id: &str,
        helper_id: &str,
        requester_id: &str,
        message: &str,
        created_at: &str,
    ) -> Result<(HelpRequestRow, bool)> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO help_requests
                   (id, post_id, helper_id, requester_id, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, post_id, helper_id, requester_id, message, created_at],
            )? > 0;

            let row = conn
                .query_row(
                    "SELECT id, post_id, helper_id, requester_id, message, status, created_at
                     FROM help_requests WHERE post_id = ?1 AND requester_id = ?2",
                    [post_id, requester_id],
                    |row| {
                        Ok(HelpRequestRow {
                            id: row.get(0)?,
                            post_id: row.get(1)?,
                            helper_id: row.get(2)?,
                            requester_id: row.get(3)?,
                            message: row.get(4)?,
                            status: row.get(5)?,
                            created_at: row.get(6)?,
                        })
                    },
                )
                .optional()?
                .ok_or_else(|| anyhow!("help request missing after insert"))?;

            Ok((row, inserted))
        })
    }

    // -- Conversations --

    pub fn find_conversation(
        &self,
        post_id: &str,
        helper_id: &str,
        requester_id: &str,
    ) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation_by_triple(conn, post_id, helper_id, requester_id))
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{CONVERSATION_COLUMNS} WHERE id = ?1"),
                [id],
                map_conversation_row,
            )
            .optional()
        })
    }

    /// Create the conversation and its first message in one transaction.
    /// A unique conflict on (post, helper, requester) means a concurrent
    /// identical request won; the winner's row is returned instead of an
    /// error.
    #[allow(clippy::too_many_arguments)]
    pub fn create_conversation_with_message(
        &self,
        conversation_id: &str,
        post_id: &str,
        helper_id: &str,
        requester_id: &str,
        message_id: &str,
        sender_id: &str,
        body: &str,
        created_at: &str,
    ) -> Result<ConversationInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let inserted = match tx.execute(
                "INSERT INTO conversations
                   (id, post_id, helper_id, requester_id, last_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![conversation_id, post_id, helper_id, requester_id, body, created_at],
            ) {
                Ok(_) => true,
                Err(e) if is_unique_violation(&e) => false,
                Err(e) => return Err(e.into()),
            };

            if inserted {
                tx.execute(
                    "INSERT INTO messages (id, conversation_id, sender_id, body, is_read, created_at)
                     VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                    rusqlite::params![message_id, conversation_id, sender_id, body, created_at],
                )?;
                tx.commit()?;

                return Ok(ConversationInsert::Created {
                    conversation: ConversationRow {
                        id: conversation_id.to_string(),
                        post_id: post_id.to_string(),
                        helper_id: helper_id.to_string(),
                        requester_id: requester_id.to_string(),
                        last_message: Some(body.to_string()),
                        created_at: created_at.to_string(),
                        updated_at: created_at.to_string(),
                    },
                    message: MessageRow {
                        id: message_id.to_string(),
                        conversation_id: conversation_id.to_string(),
                        sender_id: sender_id.to_string(),
                        body: body.to_string(),
                        is_read: false,
                        created_at: created_at.to_string(),
                    },
                });
            }

            let conversation =
                query_conversation_by_triple(&tx, post_id, helper_id, requester_id)?
                    .ok_or_else(|| anyhow!("conversation vanished after unique conflict"))?;
            let first_message_id = query_first_message_id(&tx, &conversation.id)?;
            tx.commit()?;

            Ok(ConversationInsert::Existing {
                conversation,
                first_message_id,
            })
        })
    }

    /// Caller's inbox: conversations they are a party to, most recently
    /// updated first, each with the count of unread messages from the
    /// other party.
    pub fn list_conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<(ConversationRow, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.helper_id, c.requester_id, c.last_message,
                        c.created_at, c.updated_at,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.conversation_id = c.id
                            AND m.sender_id <> ?1
                            AND m.is_read = 0) AS unread
                 FROM conversations c
                 WHERE c.helper_id = ?1 OR c.requester_id = ?1
                 ORDER BY c.updated_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok((map_conversation_row(row)?, row.get::<_, i64>(7)? as u64))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Distinct helper/requester ids across a post's conversations. The
    /// author-exclusion rule lives with the recompute, not here.
    pub fn conversation_participants(&self, post_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT helper_id FROM conversations WHERE post_id = ?1
                 UNION
                 SELECT requester_id FROM conversations WHERE post_id = ?1",
            )?;

            let ids = stmt
                .query_map([post_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(ids)
        })
    }

    pub fn first_message_id(&self, conversation_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| query_first_message_id(conn, conversation_id))
    }

    // -- Messages --

    /// Append a message and refresh the parent conversation's denormalized
    /// last_message/updated_at in the same transaction.
    pub fn append_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
        created_at: &str,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, body, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                rusqlite::params![id, conversation_id, sender_id, body, created_at],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![conversation_id, body, created_at],
            )?;

            tx.commit()?;

            Ok(MessageRow {
                id: id.to_string(),
                conversation_id: conversation_id.to_string(),
                sender_id: sender_id.to_string(),
                body: body.to_string(),
                is_read: false,
                created_at: created_at.to_string(),
            })
        })
    }

    /// All messages of a conversation in (created_at, id) ascending order.
    /// Consumers rely on this order for display and for diffing.
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, body, is_read, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;

            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        body: row.get(3)?,
                        is_read: row.get::<_, i64>(4)? != 0,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Flip unread messages from the other party to read. The predicate
    /// only ever moves 0 -> 1, so repeated calls are no-ops.
    pub fn mark_messages_read(&self, conversation_id: &str, reader_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ?1 AND sender_id <> ?2 AND is_read = 0",
                [conversation_id, reader_id],
            )?;
            Ok(changed as u64)
        })
    }
}

const CONVERSATION_COLUMNS: &str =
    "SELECT id, post_id, helper_id, requester_id, last_message, created_at, updated_at
     FROM conversations";

fn map_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        helper_id: row.get(2)?,
        requester_id: row.get(3)?,
        last_message: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn query_post(conn: &Connection, id: &str) -> Result<Option<PostRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, author_id, author_name, post_type, status,
                participant_count, last_activity_at, created_at
         FROM posts WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(PostRow {
                id: row.get(0)?,
                author_id: row.get(1)?,
                author_name: row.get(2)?,
                post_type: row.get(3)?,
                status: row.get(4)?,
                participant_count: row.get(5)?,
                last_activity_at: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversation_by_triple(
    conn: &Connection,
    post_id: &str,
    helper_id: &str,
    requester_id: &str,
) -> Result<Option<ConversationRow>> {
    conn.query_row(
        &format!("{CONVERSATION_COLUMNS} WHERE post_id = ?1 AND helper_id = ?2 AND requester_id = ?3"),
        [post_id, helper_id, requester_id],
        map_conversation_row,
    )
    .optional()
}

fn query_first_message_id(conn: &Connection, conversation_id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM messages WHERE conversation_id = ?1
         ORDER BY created_at ASC, id ASC LIMIT 1",
        [conversation_id],
        |row| row.get(0),
    )
    .optional()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_post(db: &Database, post: &str, author: &str) {
        db.create_post(post, author, Some("Avery"), "request", "open")
            .unwrap();
    }

    #[test]
    fn conversation_unique_triple_resolves_to_winner() {
        let db = test_db();
        seed_post(&db, "p1", "author");

        let first = db
            .create_conversation_with_message(
                "c1", "p1", "helper", "author", "m1", "helper", "hi there", "2026-08-01T10:00:00.000000Z",
            )
            .unwrap();
        let ConversationInsert::Created { conversation, message } = first else {
            panic!("expected creation");
        };
        assert_eq!(conversation.id, "c1");
        assert_eq!(message.id, "m1");

        // Same triple again, as a lost race would see it.
        let second = db
            .create_conversation_with_message(
                "c2", "p1", "helper", "author", "m2", "helper", "hi again", "2026-08-01T10:00:01.000000Z",
            )
            .unwrap();
        let ConversationInsert::Existing { conversation, first_message_id } = second else {
            panic!("expected existing row");
        };
        assert_eq!(conversation.id, "c1");
        assert_eq!(first_message_id.as_deref(), Some("m1"));

        // The losing call must not have appended its message.
        assert_eq!(db.list_messages("c1").unwrap().len(), 1);
    }

    #[test]
    fn message_order_breaks_timestamp_ties_by_id() {
        let db = test_db();
        seed_post(&db, "p1", "author");
        db.create_conversation_with_message(
            "c1", "p1", "helper", "author", "m-a", "helper", "first", "2026-08-01T10:00:00.000000Z",
        )
        .unwrap();

        // Two appends sharing one timestamp, inserted against id order.
        let at = "2026-08-01T10:00:05.000000Z";
        db.append_message("m-z", "c1", "author", "tie late id", at).unwrap();
        db.append_message("m-b", "c1", "helper", "tie early id", at).unwrap();

        let ids: Vec<String> = db
            .list_messages("c1")
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m-a", "m-b", "m-z"]);
    }

    #[test]
    fn append_refreshes_conversation_preview() {
        let db = test_db();
        seed_post(&db, "p1", "author");
        db.create_conversation_with_message(
            "c1", "p1", "helper", "author", "m1", "helper", "hello", "2026-08-01T10:00:00.000000Z",
        )
        .unwrap();

        db.append_message("m2", "c1", "author", "welcome", "2026-08-01T10:01:00.000000Z")
            .unwrap();

        let conv = db.get_conversation("c1").unwrap().unwrap();
        assert_eq!(conv.last_message.as_deref(), Some("welcome"));
        assert_eq!(conv.updated_at, "2026-08-01T10:01:00.000000Z");
    }

    #[test]
    fn mark_read_flips_only_counterparty_messages_once() {
        let db = test_db();
        seed_post(&db, "p1", "author");
        db.create_conversation_with_message(
            "c1", "p1", "helper", "author", "m1", "helper", "hello", "2026-08-01T10:00:00.000000Z",
        )
        .unwrap();
        db.append_message("m2", "c1", "author", "reply", "2026-08-01T10:01:00.000000Z")
            .unwrap();
        db.append_message("m3", "c1", "helper", "more", "2026-08-01T10:02:00.000000Z")
            .unwrap();

        // Author reads: only helper's messages flip.
        assert_eq!(db.mark_messages_read("c1", "author").unwrap(), 2);
        let by_id = |id: &str| {
            db.list_messages("c1")
                .unwrap()
                .into_iter()
                .find(|m| m.id == id)
                .unwrap()
        };
        assert!(by_id("m1").is_read);
        assert!(by_id("m3").is_read);
        assert!(!by_id("m2").is_read);

        // Repeat is a no-op; nothing reverts.
        assert_eq!(db.mark_messages_read("c1", "author").unwrap(), 0);
        assert!(by_id("m1").is_read);
    }

    #[test]
    fn inbox_listing_counts_unread_from_other_party() {
        let db = test_db();
        seed_post(&db, "p1", "author");
        db.create_conversation_with_message(
            "c1", "p1", "helper", "author", "m1", "helper", "hello", "2026-08-01T10:00:00.000000Z",
        )
        .unwrap();
        db.append_message("m2", "c1", "helper", "anyone there?", "2026-08-01T10:05:00.000000Z")
            .unwrap();

        let inbox = db.list_conversations_for_user("author").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].1, 2);

        // The sender's own unsent-read messages don't count against them.
        let helper_inbox = db.list_conversations_for_user("helper").unwrap();
        assert_eq!(helper_inbox[0].1, 0);
    }

    #[test]
    fn participants_union_is_distinct() {
        let db = test_db();
        seed_post(&db, "p1", "author");
        db.create_conversation_with_message(
            "c1", "p1", "u1", "author", "m1", "u1", "hi", "2026-08-01T10:00:00.000000Z",
        )
        .unwrap();
        db.create_conversation_with_message(
            "c2", "p1", "u2", "author", "m2", "u2", "hi", "2026-08-01T10:00:01.000000Z",
        )
        .unwrap();

        let mut ids = db.conversation_participants("p1").unwrap();
        ids.sort();
        assert_eq!(ids, vec!["author", "u1", "u2"]);
    }

    #[test]
    fn help_offer_is_created_once_per_post_and_helper() {
        let db = test_db();
        seed_post(&db, "p1", "author");

        let (first, created) = db
            .create_help_offer(
                "o1", "p1", "helper", "author", "I can help",
                Some("weekends"), None, None, "2026-08-01T10:00:00.000000Z",
            )
            .unwrap();
        assert!(created);

        let (second, created) = db
            .create_help_offer(
                "o2", "p1", "helper", "author", "double submit",
                None, None, None, "2026-08-01T10:00:02.000000Z",
            )
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.message, "I can help");
    }
}
