use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use aidlink_db::models::{parse_id, parse_timestamp};
use aidlink_types::api::{Claims, ConversationSummary};
use aidlink_types::error::CoreError;

use crate::error::{join_error, ApiError};
use crate::state::AppState;

/// The caller's inbox: conversations they are a party to, most recently
/// updated first, with per-conversation unread counts.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let user_id = claims.sub;
    let rows = tokio::task::spawn_blocking(move || {
        Ok::<_, CoreError>(st.db.list_conversations_for_user(&user_id.to_string())?)
    })
    .await
    .map_err(join_error)??;

    let summaries: Vec<ConversationSummary> = rows
        .into_iter()
        .map(|(row, unread)| ConversationSummary {
            id: parse_id(&row.id, "conversation"),
            post_id: parse_id(&row.post_id, "conversation post"),
            helper_id: parse_id(&row.helper_id, "conversation helper"),
            requester_id: parse_id(&row.requester_id, "conversation requester"),
            last_message: row.last_message,
            unread,
            created_at: parse_timestamp(&row.created_at, "conversation"),
            updated_at: parse_timestamp(&row.updated_at, "conversation"),
        })
        .collect();

    Ok(Json(summaries))
}
