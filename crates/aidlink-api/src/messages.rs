use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use uuid::Uuid;

use aidlink_types::api::{
    Claims, MarkReadResponse, MessageResponse, SendMessageRequest, SendMessageResponse,
};
use aidlink_types::error::CoreError;
use aidlink_types::events::GatewayEvent;
use aidlink_types::models::Identity;

use crate::error::{join_error, ApiError};
use crate::interactions::prime_resolver;
use crate::state::AppState;

/// A successful response is the only proof of delivery; on any error the
/// caller must assume the message was not persisted.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let sender = claims.sub;
    let (message, sender_name) = tokio::task::spawn_blocking(move || {
        prime_resolver(&st, &claims);
        let message = st.channel.append(conversation_id, sender, &req.text)?;
        let sender_name = st.resolver.resolve(sender).display_name;
        Ok::<_, CoreError>((message, sender_name))
    })
    .await
    .map_err(join_error)??;

    // Live fan-out after the append is durable. Subscribers deduplicate by
    // id, so also receiving this via the direct response is fine.
    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        id: message.id,
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        sender_name,
        body: message.body.clone(),
        created_at: message.created_at,
    });

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message_id: message.id,
            created_at: message.created_at,
        }),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let viewer = claims.sub;
    let (messages, names) = tokio::task::spawn_blocking(move || {
        prime_resolver(&st, &claims);
        let conversation = st.channel.conversation(conversation_id, viewer)?;
        let messages = st.channel.list_ordered(conversation_id, viewer)?;

        let mut names = HashMap::new();
        for party in [conversation.helper_id, conversation.requester_id] {
            names.insert(party, st.resolver.resolve(party).display_name);
        }
        Ok::<_, CoreError>((messages, names))
    })
    .await
    .map_err(join_error)??;

    let body: Vec<MessageResponse> = messages
        .into_iter()
        .map(|m| MessageResponse {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            sender_name: names
                .get(&m.sender_id)
                .cloned()
                .unwrap_or_else(|| Identity::PLACEHOLDER_NAME.to_string()),
            body: m.body,
            is_read: m.is_read,
            created_at: m.created_at,
        })
        .collect();

    Ok(Json(body))
}

pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let reader = claims.sub;
    let marked = tokio::task::spawn_blocking(move || {
        Ok::<_, CoreError>(st.channel.mark_read(conversation_id, reader)?)
    })
    .await
    .map_err(join_error)??;

    if marked > 0 {
        state.dispatcher.broadcast(GatewayEvent::ConversationRead {
            conversation_id,
            reader_id: reader,
        });
    }

    Ok(Json(MarkReadResponse { marked }))
}
