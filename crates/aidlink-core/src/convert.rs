//! Row-to-domain conversions. Storage corruption is logged and defaulted
//! rather than failing a whole page, matching the lenient-read policy of
//! the db layer's parse helpers.

use aidlink_db::models::{parse_id, parse_timestamp, ConversationRow, HelpOfferRow, HelpRequestRow, MessageRow};
use aidlink_types::models::{Conversation, HelpOffer, HelpRequest, InteractionStatus, Message};
use tracing::warn;

pub(crate) fn conversation_from_row(row: ConversationRow) -> Conversation {
    Conversation {
        id: parse_id(&row.id, "conversation"),
        post_id: parse_id(&row.post_id, "conversation post"),
        helper_id: parse_id(&row.helper_id, "conversation helper"),
        requester_id: parse_id(&row.requester_id, "conversation requester"),
        last_message: row.last_message,
        created_at: parse_timestamp(&row.created_at, "conversation"),
        updated_at: parse_timestamp(&row.updated_at, "conversation"),
    }
}

pub(crate) fn message_from_row(row: MessageRow) -> Message {
    Message {
        id: parse_id(&row.id, "message"),
        conversation_id: parse_id(&row.conversation_id, "message conversation"),
        sender_id: parse_id(&row.sender_id, "message sender"),
        body: row.body,
        is_read: row.is_read,
        created_at: parse_timestamp(&row.created_at, "message"),
    }
}

pub(crate) fn status_from_row(raw: &str, context: &str) -> InteractionStatus {
    InteractionStatus::parse(raw).unwrap_or_else(|| {
        warn!("Corrupt {} status '{}'", context, raw);
        InteractionStatus::Pending
    })
}

pub(crate) fn offer_from_row(row: HelpOfferRow) -> HelpOffer {
    HelpOffer {
        id: parse_id(&row.id, "help offer"),
        post_id: parse_id(&row.post_id, "help offer post"),
        helper_id: parse_id(&row.helper_id, "help offer helper"),
        requester_id: parse_id(&row.requester_id, "help offer requester"),
        message: row.message,
        availability: row.availability,
        contact_method: row.contact_method,
        skills_offered: row.skills_offered,
        status: status_from_row(&row.status, "help offer"),
        created_at: parse_timestamp(&row.created_at, "help offer"),
    }
}

pub(crate) fn request_from_row(row: HelpRequestRow) -> HelpRequest {
    HelpRequest {
        id: parse_id(&row.id, "help request"),
        post_id: parse_id(&row.post_id, "help request post"),
        helper_id: parse_id(&row.helper_id, "help request helper"),
        requester_id: parse_id(&row.requester_id, "help request requester"),
        message: row.message,
        status: status_from_row(&row.status, "help request"),
        created_at: parse_timestamp(&row.created_at, "help request"),
    }
}
