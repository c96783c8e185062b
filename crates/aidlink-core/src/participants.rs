use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use aidlink_db::Database;
use aidlink_types::error::CoreError;

use crate::collab::PostStore;

const RECOMPUTE_ATTEMPTS: u32 = 3;

/// Derived read-model: the number of distinct non-author participants
/// across a post's conversations, written back onto the post together with
/// a last-activity timestamp.
///
/// The count is recomputed from the conversation set on every call, never
/// incremented, so concurrent writers cannot compound drift.
#[derive(Clone)]
pub struct ParticipantCounter {
    db: Arc<Database>,
    posts: Arc<dyn PostStore>,
}

impl ParticipantCounter {
    pub fn new(db: Arc<Database>, posts: Arc<dyn PostStore>) -> Self {
        Self { db, posts }
    }

    /// Recompute and write back. Idempotent and order-independent for a
    /// given conversation set. Transient write failures re-read and
    /// recompute before retrying.
    pub fn recompute(&self, post_id: Uuid) -> Result<u32, CoreError> {
        let post = self
            .posts
            .get_post(post_id)?
            .ok_or(CoreError::NotFound("post"))?;
        let author = post.author_id.to_string();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let ids = self.db.conversation_participants(&post_id.to_string())?;
            let count = ids.iter().filter(|id| **id != author).count() as u32;

            match self.posts.update_post_activity(post_id, count, Utc::now()) {
                Ok(()) => {
                    debug!("post {} has {} participants", post_id, count);
                    return Ok(count);
                }
                Err(e) if e.is_transient() && attempt < RECOMPUTE_ATTEMPTS => {
                    warn!(
                        "attempt {}: transient failure writing participant count for {}: {}",
                        attempt, post_id, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
