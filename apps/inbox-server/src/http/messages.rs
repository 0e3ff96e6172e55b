use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use inbox_types::dto::{ListMessagesQuery, Page, SendMessageRequest};
use inbox_types::entities::Message;
use inbox_types::{AppError, AppResult};
use uuid::Uuid;

use crate::http::auth_extract::identity_from_headers;
use crate::jobs::OutboundJob;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> AppResult<Json<Page<Message>>> {
    identity_from_headers(&state, &headers)?;
    let page = state.store.list_messages(conversation_id, &query).await?;
    Ok(Json(page))
}

/// `POST /conversations/:id/messages` — persists the outbound message
/// immediately (so it shows up in the thread right away, PENDING) and
/// hands the actual provider send to the outbound worker pool.
pub async fn send(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> AppResult<Json<Message>> {
    let identity = identity_from_headers(&state, &headers)?;
    request.validate().map_err(AppError::Validation)?;

    let conversation = state.store.get_conversation(conversation_id).await?;
    let recipient_provider_id = conversation.contact.provider_id.clone();

    let message = state
        .store
        .insert_outbound_message(conversation_id, identity.user_id, &request.content)
        .await?;

    let job = OutboundJob {
        message_id: message.id,
        conversation_id,
        channel_id: conversation.channel.id,
        recipient_provider_id,
        content: request.content,
        attempt: 0,
    };

    if state.outbound_jobs.send(job).await.is_err() {
        return Err(AppError::Fatal(anyhow::anyhow!("outbound queue is closed")));
    }

    Ok(Json(message))
}
