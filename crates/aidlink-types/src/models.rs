use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a post is asking the community for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Request,
    Offer,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Offer => "offer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "request" => Some(Self::Request),
            "offer" => Some(Self::Offer),
            _ => None,
        }
    }
}

/// The slice of a post this core reads. Posts are owned by the wider
/// platform; only the author and lifecycle status matter here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub kind: PostKind,
    pub status: String,
}

/// Which side of the help exchange an action puts the actor on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    OfferHelp,
    RequestHelp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// The record of an actor offering to help on a post. Distinct from the
/// Conversation it spawns; at most one exists per (post, helper).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpOffer {
    pub id: Uuid,
    pub post_id: Uuid,
    pub helper_id: Uuid,
    pub requester_id: Uuid,
    pub message: String,
    pub availability: Option<String>,
    pub contact_method: Option<String>,
    pub skills_offered: Option<String>,
    pub status: InteractionStatus,
    pub created_at: DateTime<Utc>,
}

/// The record of an actor asking for help on an offer post. At most one
/// exists per (post, requester).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpRequest {
    pub id: Uuid,
    pub post_id: Uuid,
    pub helper_id: Uuid,
    pub requester_id: Uuid,
    pub message: String,
    pub status: InteractionStatus,
    pub created_at: DateTime<Utc>,
}

/// The unique two-party thread for one post and one (helper, requester)
/// pair. Roles are fixed by who initiated; the pair is unique per post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub post_id: Uuid,
    pub helper_id: Uuid,
    pub requester_id: Uuid,
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether the given user is one of the two parties.
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.helper_id == user_id || self.requester_id == user_id
    }

    /// The other party from the given user's point of view.
    pub fn other_party(&self, user_id: Uuid) -> Uuid {
        if self.helper_id == user_id {
            self.requester_id
        } else {
            self.helper_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Display identity a user resolves to. Never absent: the resolver falls
/// back to a placeholder rather than failing a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl Identity {
    pub const PLACEHOLDER_NAME: &'static str = "Community member";

    pub fn placeholder(user_id: Uuid) -> Self {
        Self {
            user_id,
            display_name: Self::PLACEHOLDER_NAME.to_string(),
            avatar_url: None,
        }
    }
}

/// Metadata attached to a user's presence on the membership channel.
/// Ephemeral; reconstructed from the live snapshot, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub online_at: DateTime<Utc>,
}
