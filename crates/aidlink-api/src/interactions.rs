use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use uuid::Uuid;

use aidlink_core::coordinator::InteractionOutcome;
use aidlink_types::api::{
    Claims, CreateConversationRequest, CreateConversationResponse, OfferHelpRequest,
    OfferHelpResponse, RequestHelpRequest, RequestHelpResponse,
};
use aidlink_types::error::CoreError;
use aidlink_types::events::GatewayEvent;
use aidlink_types::models::Identity;

use crate::error::{join_error, ApiError};
use crate::state::AppState;

pub async fn offer_help(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OfferHelpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Run blocking DB work off the async runtime
    let st = state.clone();
    let actor = claims.sub;
    let (outcome, sender_name) = tokio::task::spawn_blocking(move || {
        prime_resolver(&st, &claims);
        let outcome = st.coordinator.offer_help(
            post_id,
            actor,
            &req.message,
            req.availability.as_deref(),
            req.contact_method.as_deref(),
            req.skills_offered.as_deref(),
        )?;
        let sender_name = st.resolver.resolve(actor).display_name;
        Ok::<_, CoreError>((outcome, sender_name))
    })
    .await
    .map_err(join_error)??;

    publish_first_message(&state, &outcome.interaction, &sender_name);

    Ok((
        StatusCode::CREATED,
        Json(OfferHelpResponse {
            offer_id: outcome.offer.id,
            conversation_id: outcome.interaction.conversation.id,
        }),
    ))
}

pub async fn request_help(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RequestHelpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let actor = claims.sub;
    let (outcome, sender_name) = tokio::task::spawn_blocking(move || {
        prime_resolver(&st, &claims);
        let outcome = st.coordinator.request_help(post_id, actor, &req.message)?;
        let sender_name = st.resolver.resolve(actor).display_name;
        Ok::<_, CoreError>((outcome, sender_name))
    })
    .await
    .map_err(join_error)??;

    publish_first_message(&state, &outcome.interaction, &sender_name);

    Ok((
        StatusCode::CREATED,
        Json(RequestHelpResponse {
            request_id: outcome.request.id,
            conversation_id: outcome.interaction.conversation.id,
            is_existing: outcome.interaction.is_existing,
        }),
    ))
}

pub async fn create_or_get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let caller = claims.sub;
    let (outcome, sender_name) = tokio::task::spawn_blocking(move || {
        prime_resolver(&st, &claims);
        let outcome = st.coordinator.create_or_get(
            req.post_id,
            req.helper_id,
            req.requester_id,
            caller,
            &req.initial_message,
        )?;
        let sender_name = st.resolver.resolve(caller).display_name;
        Ok::<_, CoreError>((outcome, sender_name))
    })
    .await
    .map_err(join_error)??;

    publish_first_message(&state, &outcome, &sender_name);

    Ok(Json(CreateConversationResponse {
        conversation_id: outcome.conversation.id,
        is_existing: outcome.is_existing,
    }))
}

pub(crate) fn prime_resolver(state: &AppState, claims: &Claims) {
    state.resolver.prime(Identity {
        user_id: claims.sub,
        display_name: claims.name.clone(),
        avatar_url: None,
    });
}

/// Fan the first message out to live subscribers, once: `new_message` is
/// only set when this call created the conversation.
fn publish_first_message(state: &AppState, interaction: &InteractionOutcome, sender_name: &str) {
    if let Some(message) = &interaction.new_message {
        state.dispatcher.broadcast(GatewayEvent::MessageCreate {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            sender_name: sender_name.to_string(),
            body: message.body.clone(),
            created_at: message.created_at,
        });
    }
}
