use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared between aidlink-api (REST middleware) and
/// aidlink-gateway (WebSocket authentication). Canonical definition lives
/// here in aidlink-types to eliminate duplication. Tokens are issued by
/// the platform's auth service, not by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Help interactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfferHelpRequest {
    pub message: String,
    pub availability: Option<String>,
    pub contact_method: Option<String>,
    pub skills_offered: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OfferHelpResponse {
    pub offer_id: Uuid,
    pub conversation_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestHelpRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RequestHelpResponse {
    pub request_id: Uuid,
    pub conversation_id: Uuid,
    pub is_existing: bool,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub post_id: Uuid,
    pub helper_id: Uuid,
    pub requester_id: Uuid,
    pub initial_message: String,
}

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub conversation_id: Uuid,
    pub is_existing: bool,
}

/// One row of the caller's inbox listing.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub post_id: Uuid,
    pub helper_id: Uuid,
    pub requester_id: Uuid,
    pub last_message: Option<String>,
    pub unread: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked: u64,
}
