use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use inbox_types::dto::{ListConversationsQuery, Page};
use inbox_types::entities::{ConversationEventType, ConversationWithRelations};
use inbox_types::events::EventPayload;
use inbox_types::AppResult;
use serde_json::Value;
use uuid::Uuid;

use crate::http::auth_extract::identity_from_headers;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListConversationsQuery>,
) -> AppResult<Json<Page<ConversationWithRelations>>> {
    let identity = identity_from_headers(&state, &headers)?;
    let page = state
        .store
        .list_conversations(identity.organization_id, &query)
        .await?;
    Ok(Json(page))
}

pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ConversationWithRelations>> {
    identity_from_headers(&state, &headers)?;
    let conversation = state.store.get_conversation(conversation_id).await?;
    Ok(Json(conversation))
}

pub async fn accept(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<inbox_types::entities::Conversation>> {
    let identity = identity_from_headers(&state, &headers)?;
    let conversation = state
        .store
        .accept_conversation(conversation_id, identity.user_id)
        .await?;

    record_and_publish(
        &state,
        &conversation,
        ConversationEventType::Accepted,
        Some(identity.user_id),
        EventPayload::ConversationAccepted {
            conversation: conversation.clone(),
        },
    )
    .await?;

    state
        .bus
        .publish(
            conversation.organization_id,
            EventPayload::ConversationUpdated {
                conversation: conversation.clone(),
            },
        )
        .await;

    Ok(Json(conversation))
}

pub async fn release(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<inbox_types::entities::Conversation>> {
    let identity = identity_from_headers(&state, &headers)?;
    let conversation = state
        .store
        .release_conversation(conversation_id, identity.user_id)
        .await?;

    record_and_publish(
        &state,
        &conversation,
        ConversationEventType::Released,
        Some(identity.user_id),
        EventPayload::ConversationReleased {
            conversation: conversation.clone(),
        },
    )
    .await?;

    Ok(Json(conversation))
}

pub async fn complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<inbox_types::entities::Conversation>> {
    let identity = identity_from_headers(&state, &headers)?;
    let conversation = state
        .store
        .complete_conversation(conversation_id, identity.user_id)
        .await?;

    record_and_publish(
        &state,
        &conversation,
        ConversationEventType::Completed,
        Some(identity.user_id),
        EventPayload::ConversationCompleted {
            conversation: conversation.clone(),
        },
    )
    .await?;

    Ok(Json(conversation))
}

async fn record_and_publish(
    state: &AppState,
    conversation: &inbox_types::entities::Conversation,
    event_type: ConversationEventType,
    actor_id: Option<Uuid>,
    payload: EventPayload,
) -> AppResult<()> {
    state
        .store
        .append_event(conversation.id, event_type, actor_id, Value::Null)
        .await?;
    state.bus.publish(conversation.organization_id, payload).await;
    Ok(())
}
