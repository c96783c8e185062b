//! Database row types — these map directly to SQLite rows.
//! Distinct from aidlink-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub post_type: String,
    pub status: String,
    pub participant_count: i64,
    pub last_activity_at: Option<String>,
    pub created_at: String,
}

pub struct ProfileRow {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

pub struct HelpOfferRow {
    pub id: String,
    pub post_id: String,
    pub helper_id: String,
    pub requester_id: String,
    pub message: String,
    pub availability: Option<String>,
    pub contact_method: Option<String>,
    pub skills_offered: Option<String>,
    pub status: String,
    pub created_at: String,
}

pub struct HelpRequestRow {
    pub id: String,
    pub post_id: String,
    pub helper_id: String,
    pub requester_id: String,
    pub message: String,
    pub status: String,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub post_id: String,
    pub helper_id: String,
    pub requester_id: String,
    pub last_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: String,
}

/// Parse a stored id, logging corruption rather than failing a whole page.
pub fn parse_id(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", context, raw, e);
        Uuid::default()
    })
}

/// Parse a stored timestamp. Application writes are RFC 3339; rows created
/// by SQLite's datetime('now') default lack a timezone and are taken as UTC.
pub fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} timestamp '{}': {}", context, raw, e);
            DateTime::default()
        })
}

/// Timestamp format for application writes. Fixed-width so the textual
/// order matches the chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
