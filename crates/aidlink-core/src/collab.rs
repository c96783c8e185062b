//! Collaborator interfaces for the state this core consumes but does not
//! own. Components receive these as explicit handles so they can be tested
//! against fakes; the SQLite implementations below are the production
//! wiring.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use aidlink_db::models::{format_timestamp, parse_id};
use aidlink_db::Database;
use aidlink_types::error::CoreError;
use aidlink_types::models::{Identity, Post, PostKind};

pub trait PostStore: Send + Sync {
    fn get_post(&self, id: Uuid) -> Result<Option<Post>, CoreError>;

    fn update_post_activity(
        &self,
        id: Uuid,
        participant_count: u32,
        last_activity_at: DateTime<Utc>,
    ) -> Result<(), CoreError>;
}

pub trait ProfileStore: Send + Sync {
    fn profile_by_id(&self, id: Uuid) -> Result<Option<Identity>, CoreError>;

    /// Display name denormalized onto any post authored by the user.
    fn author_name_from_posts(&self, id: Uuid) -> Result<Option<String>, CoreError>;
}

pub struct SqlitePostStore {
    db: Arc<Database>,
}

impl SqlitePostStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl PostStore for SqlitePostStore {
    fn get_post(&self, id: Uuid) -> Result<Option<Post>, CoreError> {
        let row = self.db.get_post(&id.to_string())?;

        Ok(row.map(|r| Post {
            id,
            author_id: parse_id(&r.author_id, "post author"),
            kind: PostKind::parse(&r.post_type).unwrap_or_else(|| {
                warn!("Corrupt post_type '{}' on post {}", r.post_type, r.id);
                PostKind::Request
            }),
            status: r.status,
        }))
    }

    fn update_post_activity(
        &self,
        id: Uuid,
        participant_count: u32,
        last_activity_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        // A busy WAL writer is the expected failure here; classify it as
        // transient so the counter's read-recompute-write retry applies.
        let found = self
            .db
            .update_post_activity(
                &id.to_string(),
                participant_count,
                &format_timestamp(last_activity_at),
            )
            .map_err(|e| CoreError::TransientStorage(format!("{e:#}")))?;

        if !found {
            return Err(CoreError::NotFound("post"));
        }
        Ok(())
    }
}

pub struct SqliteProfileStore {
    db: Arc<Database>,
}

impl SqliteProfileStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl ProfileStore for SqliteProfileStore {
    fn profile_by_id(&self, id: Uuid) -> Result<Option<Identity>, CoreError> {
        let row = self.db.get_profile(&id.to_string())?;

        Ok(row.map(|r| Identity {
            user_id: id,
            display_name: r.display_name,
            avatar_url: r.avatar_url,
        }))
    }

    fn author_name_from_posts(&self, id: Uuid) -> Result<Option<String>, CoreError> {
        Ok(self.db.author_name_from_posts(&id.to_string())?)
    }
}
