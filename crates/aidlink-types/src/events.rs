use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PresenceMeta;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, display_name: String },

    /// A new message was appended to a conversation
    MessageCreate {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        body: String,
        created_at: chrono::DateTime<chrono::Utc>,
    },

    /// The other party viewed the conversation; their unread messages
    /// flipped to read
    ConversationRead {
        conversation_id: Uuid,
        reader_id: Uuid,
    },

    /// A user started typing in a conversation
    TypingStart {
        conversation_id: Uuid,
        user_id: Uuid,
        display_name: String,
    },

    /// A user started tracking presence on the membership channel
    PresenceJoin { user_id: Uuid, meta: PresenceMeta },

    /// A user left the membership channel; last_seen is the leave time
    PresenceLeave {
        user_id: Uuid,
        last_seen: chrono::DateTime<chrono::Utc>,
    },

    /// Full membership snapshot. Receivers must reconcile their entire
    /// local presence state against it, overriding anything inferred.
    PresenceSync {
        membership: HashMap<Uuid, Vec<PresenceMeta>>,
    },
}

impl GatewayEvent {
    /// Returns the conversation_id if this event is scoped to a specific
    /// conversation. Events that return `None` are global and are
    /// delivered to all clients.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate {
                conversation_id, ..
            } => Some(*conversation_id),
            Self::ConversationRead {
                conversation_id, ..
            } => Some(*conversation_id),
            Self::TypingStart {
                conversation_id, ..
            } => Some(*conversation_id),
            // Ready and presence events are global
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to events for specific conversations.
    /// Replaces the connection's subscription set; the server only
    /// forwards conversation-scoped events for conversations the client
    /// is a party to.
    Subscribe { conversation_ids: Vec<Uuid> },

    /// Announce own presence on the membership channel
    Track { avatar_url: Option<String> },

    /// Withdraw own presence without closing the connection
    Untrack,

    /// Indicate typing in a conversation
    StartTyping { conversation_id: Uuid },
}
