use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use aidlink_db::models::format_timestamp;
use aidlink_db::queries::ConversationInsert;
use aidlink_db::Database;
use aidlink_types::error::CoreError;
use aidlink_types::models::{ActionKind, Conversation, HelpOffer, HelpRequest, Message, Post};

use crate::collab::PostStore;
use crate::convert;
use crate::participants::ParticipantCounter;

/// Result of a request-or-create call. `new_message` is set only when this
/// call created the conversation; callers use it to publish the live
/// `MessageCreate` event exactly once.
pub struct InteractionOutcome {
    pub conversation: Conversation,
    pub first_message_id: Option<Uuid>,
    pub new_message: Option<Message>,
    pub is_existing: bool,
}

pub struct OfferOutcome {
    pub offer: HelpOffer,
    pub interaction: InteractionOutcome,
}

pub struct RequestOutcome {
    pub request: HelpRequest,
    pub interaction: InteractionOutcome,
}

/// Turns a help-offer/help-request action into a durable, deduplicated
/// conversation with its first message.
///
/// Safe to call repeatedly for the same (post, actor): a double-submitted
/// form or a retried network request lands on the existing row. The
/// storage layer's unique (post, helper, requester) constraint closes the
/// window between the existence check and the insert.
pub struct InteractionCoordinator {
    db: Arc<Database>,
    posts: Arc<dyn PostStore>,
    counter: ParticipantCounter,
}

impl InteractionCoordinator {
    pub fn new(db: Arc<Database>, posts: Arc<dyn PostStore>) -> Self {
        let counter = ParticipantCounter::new(db.clone(), posts.clone());
        Self { db, posts, counter }
    }

    /// Record a help offer and open (or find) its conversation.
    /// Helper is the actor; requester is the post's author.
    pub fn offer_help(
        &self,
        post_id: Uuid,
        actor_id: Uuid,
        message: &str,
        availability: Option<&str>,
        contact_method: Option<&str>,
        skills_offered: Option<&str>,
    ) -> Result<OfferOutcome, CoreError> {
        let (post, body) = self.validate_action(post_id, actor_id, message)?;

        let (offer_row, created) = self.db.create_help_offer(
            &Uuid::new_v4().to_string(),
            &post_id.to_string(),
            &actor_id.to_string(),
            &post.author_id.to_string(),
            &body,
            availability,
            contact_method,
            skills_offered,
            &format_timestamp(Utc::now()),
        )?;
        if created {
            info!("user {} offered help on post {}", actor_id, post_id);
        }

        let interaction = self.open_conversation(&post, actor_id, post.author_id, actor_id, &body)?;

        Ok(OfferOutcome {
            offer: convert::offer_from_row(offer_row),
            interaction,
        })
    }

    /// Record a help request and open (or find) its conversation.
    /// Helper is the post's author; requester is the actor.
    pub fn request_help(
        &self,
        post_id: Uuid,
        actor_id: Uuid,
        message: &str,
    ) -> Result<RequestOutcome, CoreError> {
        let (post, body) = self.validate_action(post_id, actor_id, message)?;

        let (request_row, created) = self.db.create_help_request(
            &Uuid::new_v4().to_string(),
            &post_id.to_string(),
            &post.author_id.to_string(),
            &actor_id.to_string(),
            &body,
            &format_timestamp(Utc::now()),
        )?;
        if created {
            info!("user {} requested help on post {}", actor_id, post_id);
        }

        let interaction = self.open_conversation(&post, post.author_id, actor_id, actor_id, &body)?;

        Ok(RequestOutcome {
            request: convert::request_from_row(request_row),
            interaction,
        })
    }

    /// The bare request-or-create operation with roles derived from the
    /// action kind.
    pub fn request_or_create(
        &self,
        post_id: Uuid,
        actor_id: Uuid,
        kind: ActionKind,
        message: &str,
    ) -> Result<InteractionOutcome, CoreError> {
        let (post, body) = self.validate_action(post_id, actor_id, message)?;

        let (helper_id, requester_id) = match kind {
            ActionKind::OfferHelp => (actor_id, post.author_id),
            ActionKind::RequestHelp => (post.author_id, actor_id),
        };

        self.open_conversation(&post, helper_id, requester_id, actor_id, &body)
    }

    /// Explicit-roles variant backing the create-or-get endpoint. The
    /// caller must be one of the two parties.
    pub fn create_or_get(
        &self,
        post_id: Uuid,
        helper_id: Uuid,
        requester_id: Uuid,
        caller_id: Uuid,
        initial_message: &str,
    ) -> Result<InteractionOutcome, CoreError> {
        let body = initial_message.trim();
        if body.is_empty() {
            return Err(CoreError::Validation("message must not be empty"));
        }
        if helper_id == requester_id {
            return Err(CoreError::Validation("helper and requester must differ"));
        }
        if caller_id != helper_id && caller_id != requester_id {
            return Err(CoreError::Forbidden("caller is not a conversation party"));
        }

        let post = self
            .posts
            .get_post(post_id)?
            .ok_or(CoreError::NotFound("post"))?;

        self.open_conversation(&post, helper_id, requester_id, caller_id, body)
    }

    fn validate_action(
        &self,
        post_id: Uuid,
        actor_id: Uuid,
        message: &str,
    ) -> Result<(Post, String), CoreError> {
        let body = message.trim();
        if body.is_empty() {
            return Err(CoreError::Validation("message must not be empty"));
        }

        let post = self
            .posts
            .get_post(post_id)?
            .ok_or(CoreError::NotFound("post"))?;

        if post.author_id == actor_id {
            return Err(CoreError::Forbidden("cannot interact with your own post"));
        }

        Ok((post, body.to_string()))
    }

    fn open_conversation(
        &self,
        post: &Post,
        helper_id: Uuid,
        requester_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Result<InteractionOutcome, CoreError> {
        let pid = post.id.to_string();
        let hid = helper_id.to_string();
        let rid = requester_id.to_string();

        // Fast path: the conversation already exists.
        if let Some(row) = self.db.find_conversation(&pid, &hid, &rid)? {
            let first = self.db.first_message_id(&row.id)?;
            return Ok(InteractionOutcome {
                conversation: convert::conversation_from_row(row),
                first_message_id: first.map(|id| aidlink_db::models::parse_id(&id, "message")),
                new_message: None,
                is_existing: true,
            });
        }

        let now = format_timestamp(Utc::now());
        let outcome = match self.db.create_conversation_with_message(
            &Uuid::new_v4().to_string(),
            &pid,
            &hid,
            &rid,
            &Uuid::new_v4().to_string(),
            &sender_id.to_string(),
            body,
            &now,
        )? {
            ConversationInsert::Created {
                conversation,
                message,
            } => {
                let message = convert::message_from_row(message);
                InteractionOutcome {
                    conversation: convert::conversation_from_row(conversation),
                    first_message_id: Some(message.id),
                    new_message: Some(message),
                    is_existing: false,
                }
            }
            // Lost the race to a concurrent identical request; hand back
            // the winner instead of erroring the user out.
            ConversationInsert::Existing {
                conversation,
                first_message_id,
            } => InteractionOutcome {
                conversation: convert::conversation_from_row(conversation),
                first_message_id: first_message_id
                    .map(|id| aidlink_db::models::parse_id(&id, "message")),
                new_message: None,
                is_existing: true,
            },
        };

        if !outcome.is_existing {
            // Best-effort: the conversation is already durable, so a
            // failed recompute must not fail the interaction.
            if let Err(e) = self.counter.recompute(post.id) {
                warn!("participant recompute failed for post {}: {}", post.id, e);
            }
        }

        Ok(outcome)
    }
}
