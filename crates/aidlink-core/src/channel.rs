use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use aidlink_db::models::format_timestamp;
use aidlink_db::Database;
use aidlink_types::error::CoreError;
use aidlink_types::models::{Conversation, Message};

use crate::convert;

/// Append-only per-conversation message log with ordering and read state.
///
/// Appends are correctness-critical: a caller may only assume delivery
/// when the call returns Ok. Live fan-out happens at the API layer after a
/// successful append; subscribers deduplicate by id because the same
/// insert can be observed via both the direct response and the stream.
pub struct MessageChannel {
    db: Arc<Database>,
}

impl MessageChannel {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn conversation(&self, id: Uuid, viewer_id: Uuid) -> Result<Conversation, CoreError> {
        let row = self
            .db
            .get_conversation(&id.to_string())?
            .ok_or(CoreError::NotFound("conversation"))?;

        let conversation = convert::conversation_from_row(row);
        if !conversation.is_party(viewer_id) {
            return Err(CoreError::Forbidden("not a conversation party"));
        }
        Ok(conversation)
    }

    /// Insert a message and refresh the conversation preview. Rejects
    /// blank text before anything is written.
    pub fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        text: &str,
    ) -> Result<Message, CoreError> {
        let body = text.trim();
        if body.is_empty() {
            return Err(CoreError::Validation("message must not be empty"));
        }

        let conversation = self.conversation(conversation_id, sender_id)?;

        let row = self.db.append_message(
            &Uuid::new_v4().to_string(),
            &conversation.id.to_string(),
            &sender_id.to_string(),
            body,
            &format_timestamp(Utc::now()),
        )?;

        Ok(convert::message_from_row(row))
    }

    /// All messages sorted by (created_at, id) ascending. Consumers rely
    /// on this order for display and for diffing against seen messages.
    pub fn list_ordered(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<Vec<Message>, CoreError> {
        let conversation = self.conversation(conversation_id, viewer_id)?;

        let rows = self.db.list_messages(&conversation.id.to_string())?;
        Ok(rows.into_iter().map(convert::message_from_row).collect())
    }

    /// Flip every unread message from the other party to read. Returns the
    /// number of messages flipped; a repeat call is a no-op and nothing
    /// ever reverts to unread.
    pub fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<u64, CoreError> {
        let conversation = self.conversation(conversation_id, reader_id)?;

        Ok(self
            .db
            .mark_messages_read(&conversation.id.to_string(), &reader_id.to_string())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<Database>, MessageChannel, Uuid, Uuid, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let post_id = Uuid::new_v4();
        let author = Uuid::new_v4();
        let helper = Uuid::new_v4();
        db.create_post(&post_id.to_string(), &author.to_string(), None, "request", "open")
            .unwrap();

        let conversation_id = Uuid::new_v4();
        db.create_conversation_with_message(
            &conversation_id.to_string(),
            &post_id.to_string(),
            &helper.to_string(),
            &author.to_string(),
            &Uuid::new_v4().to_string(),
            &helper.to_string(),
            "opening message",
            "2026-08-01T10:00:00.000000Z",
        )
        .unwrap();

        let channel = MessageChannel::new(db.clone());
        (db, channel, conversation_id, helper, author)
    }

    #[test]
    fn append_then_list_preserves_order() {
        let (_db, channel, conversation_id, helper, author) = setup();

        channel.append(conversation_id, author, "second").unwrap();
        channel.append(conversation_id, helper, "third").unwrap();

        let bodies: Vec<String> = channel
            .list_ordered(conversation_id, helper)
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["opening message", "second", "third"]);

        // Stable across repeated calls absent new writes.
        let again: Vec<String> = channel
            .list_ordered(conversation_id, helper)
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, again);
    }

    #[test]
    fn blank_append_leaves_conversation_untouched() {
        let (db, channel, conversation_id, helper, _author) = setup();
        let before = db
            .get_conversation(&conversation_id.to_string())
            .unwrap()
            .unwrap();

        let err = channel.append(conversation_id, helper, "   ").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let after = db
            .get_conversation(&conversation_id.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(db.list_messages(&conversation_id.to_string()).unwrap().len(), 1);
    }

    #[test]
    fn non_party_is_forbidden_everywhere() {
        let (_db, channel, conversation_id, _helper, _author) = setup();
        let outsider = Uuid::new_v4();

        assert!(matches!(
            channel.append(conversation_id, outsider, "hi").unwrap_err(),
            CoreError::Forbidden(_)
        ));
        assert!(matches!(
            channel.list_ordered(conversation_id, outsider).unwrap_err(),
            CoreError::Forbidden(_)
        ));
        assert!(matches!(
            channel.mark_read(conversation_id, outsider).unwrap_err(),
            CoreError::Forbidden(_)
        ));
    }

    #[test]
    fn unknown_conversation_is_not_found() {
        let (_db, channel, _conversation_id, helper, _author) = setup();

        let err = channel.append(Uuid::new_v4(), helper, "hi").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn read_state_is_monotonic() {
        let (_db, channel, conversation_id, helper, author) = setup();
        channel.append(conversation_id, helper, "are you there?").unwrap();

        // Author reads both helper messages.
        assert_eq!(channel.mark_read(conversation_id, author).unwrap(), 2);
        assert!(channel
            .list_ordered(conversation_id, author)
            .unwrap()
            .iter()
            .all(|m| m.is_read));

        // Repeat is a no-op; nothing reverts.
        assert_eq!(channel.mark_read(conversation_id, author).unwrap(), 0);
        assert!(channel
            .list_ordered(conversation_id, author)
            .unwrap()
            .iter()
            .all(|m| m.is_read));
    }
}
