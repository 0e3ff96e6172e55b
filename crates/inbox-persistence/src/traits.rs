use async_trait::async_trait;
use inbox_types::dto::{ListConversationsQuery, ListMessagesQuery, Page};
use inbox_types::entities::{
    Channel, Contact, Conversation, ConversationEvent, ConversationEventType,
    ConversationWithRelations, FailedJob, Message, MessageDirection, MessageStatus, Provider,
};
use inbox_types::payload::{InboundContent, OutboundContent};
use inbox_types::AppResult;
use serde_json::Value;
use uuid::Uuid;

/// Outcome of inserting an inbound message: `false` means a row with the
/// same `providerMessageId` already existed and the insert was a no-op,
/// which is how the idempotency guarantee in the webhook processor is
/// ultimately enforced (the Redis fast path is only a pre-filter).
pub struct Inserted<T> {
    pub value: T,
    pub was_new: bool,
}

/// Outcome of `find_or_create_conversation`, distinguishing a reopen from
/// a fresh conversation so callers can emit `REOPENED` rather than
/// collapsing it into "not new".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationOutcome {
    Created,
    Reopened,
    Existing,
}

/// Everything the rest of the backend needs from durable storage. A
/// Postgres implementation backs production; an in-memory implementation
/// backs unit tests that would otherwise need a live database.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn get_channel(&self, channel_id: Uuid) -> AppResult<Channel>;
    async fn get_channel_by_addressing_id(
        &self,
        provider: Provider,
        addressing_id: &str,
    ) -> AppResult<Channel>;

    async fn upsert_contact(
        &self,
        organization_id: Uuid,
        provider: Provider,
        provider_id: &str,
        display_name: Option<&str>,
    ) -> AppResult<Contact>;

    /// Finds the contact's current non-completed conversation, or opens a
    /// new one. Reopens (rather than creates fresh) when the only
    /// existing conversation is COMPLETED, per the reopen-on-inbound rule.
    async fn find_or_create_conversation(
        &self,
        organization_id: Uuid,
        channel_id: Uuid,
        contact_id: Uuid,
    ) -> AppResult<(Conversation, ConversationOutcome)>;

    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<ConversationWithRelations>;

    async fn list_conversations(
        &self,
        organization_id: Uuid,
        query: &ListConversationsQuery,
    ) -> AppResult<Page<ConversationWithRelations>>;

    /// Conditional `PENDING -> ASSIGNED` transition. Returns a conflict
    /// error if another agent already holds the conversation.
    async fn accept_conversation(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
    ) -> AppResult<Conversation>;

    /// Conditional `ASSIGNED -> PENDING` transition, only honored when
    /// `agent_id` is the current owner.
    async fn release_conversation(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
    ) -> AppResult<Conversation>;

    async fn complete_conversation(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
    ) -> AppResult<Conversation>;

    /// Releases every conversation owned by `agent_id` back to PENDING;
    /// used by the socket gateway's disconnect compensation path.
    async fn release_all_for_agent(&self, agent_id: Uuid) -> AppResult<Vec<Conversation>>;

    async fn insert_inbound_message(
        &self,
        conversation_id: Uuid,
        content: &InboundContent,
        provider_message_id: Option<&str>,
    ) -> AppResult<Inserted<Message>>;

    async fn insert_outbound_message(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
        content: &OutboundContent,
    ) -> AppResult<Message>;

    async fn update_message_status(
        &self,
        message_id: Uuid,
        status: MessageStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> AppResult<Message>;

    async fn find_message_by_provider_id(
        &self,
        conversation_id: Uuid,
        provider_message_id: &str,
    ) -> AppResult<Option<Message>>;

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        query: &ListMessagesQuery,
    ) -> AppResult<Page<Message>>;

    async fn append_event(
        &self,
        conversation_id: Uuid,
        event_type: ConversationEventType,
        actor_id: Option<Uuid>,
        metadata: Value,
    ) -> AppResult<ConversationEvent>;

    async fn record_failed_job(&self, queue: &str, payload: Value, error: &str, attempts: i32) -> AppResult<()>;

    async fn list_failed_jobs(&self, queue: Option<&str>) -> AppResult<Vec<FailedJob>>;

    /// Removes a failed job and returns it, so a caller can re-enqueue the
    /// payload onto the live worker pool without leaving a stale diagnostic
    /// row behind.
    async fn requeue_failed_job(&self, id: Uuid) -> AppResult<FailedJob>;
}

/// Convenience alias, since `direction` is always derivable from which
/// insert method was called rather than being a parameter callers pick.
pub(crate) fn direction_for(content_is_inbound: bool) -> MessageDirection {
    if content_is_inbound {
        MessageDirection::Inbound
    } else {
        MessageDirection::Outbound
    }
}
