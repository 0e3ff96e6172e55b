use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use inbox_types::dto::{ListConversationsQuery, ListMessagesQuery, Page};
use inbox_types::entities::{
    AgentSummary, Channel, Contact, Conversation, ConversationEvent, ConversationEventType,
    ConversationStatus, ConversationWithRelations, FailedJob, Message, MessageDirection,
    MessageStatus, Provider,
};
use inbox_types::payload::{InboundContent, OutboundContent};
use inbox_types::{AppError, AppResult};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::traits::{ConversationOutcome, Inserted, Persistence};

/// In-process implementation of [`Persistence`] used by unit tests across
/// the workspace so conversation-service and webhook-processor logic can
/// be exercised without a live Postgres instance.
#[derive(Default)]
pub struct InMemoryStore {
    channels: DashMap<Uuid, Channel>,
    contacts: DashMap<Uuid, Contact>,
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<Vec<Message>>,
    events: Mutex<Vec<ConversationEvent>>,
    failed_jobs: Mutex<Vec<FailedJob>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_channel(&self, channel: Channel) {
        self.channels.insert(channel.id, channel);
    }
}

#[async_trait]
impl Persistence for InMemoryStore {
    async fn get_channel(&self, channel_id: Uuid) -> AppResult<Channel> {
        self.channels
            .get(&channel_id)
            .map(|c| c.clone())
            .ok_or_else(|| AppError::not_found(format!("channel {channel_id}")))
    }

    async fn get_channel_by_addressing_id(
        &self,
        provider: Provider,
        addressing_id: &str,
    ) -> AppResult<Channel> {
        self.channels
            .iter()
            .find(|c| c.provider == provider && c.addressing_id() == Some(addressing_id))
            .map(|c| c.clone())
            .ok_or_else(|| AppError::not_found(format!("channel for {addressing_id}")))
    }

    async fn upsert_contact(
        &self,
        organization_id: Uuid,
        provider: Provider,
        provider_id: &str,
        display_name: Option<&str>,
    ) -> AppResult<Contact> {
        if let Some(mut existing) = self
            .contacts
            .iter_mut()
            .find(|c| c.organization_id == organization_id && c.provider == provider && c.provider_id == provider_id)
        {
            if let Some(name) = display_name {
                existing.display_name = Some(name.to_string());
            }
            existing.last_seen_at = Utc::now();
            return Ok(existing.clone());
        }

        let contact = Contact {
            id: Uuid::new_v4(),
            organization_id,
            provider,
            provider_id: provider_id.to_string(),
            display_name: display_name.map(str::to_string),
            metadata: Value::Null,
            last_seen_at: Utc::now(),
        };
        self.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn find_or_create_conversation(
        &self,
        organization_id: Uuid,
        channel_id: Uuid,
        contact_id: Uuid,
    ) -> AppResult<(Conversation, ConversationOutcome)> {
        let mut conversations = self.conversations.lock().unwrap();

        if let Some(existing) = conversations
            .iter()
            .find(|c| c.contact_id == contact_id && c.status != ConversationStatus::Completed)
        {
            return Ok((existing.clone(), ConversationOutcome::Existing));
        }

        if let Some(completed) = conversations
            .iter_mut()
            .find(|c| c.contact_id == contact_id && c.status == ConversationStatus::Completed)
        {
            completed.status = ConversationStatus::Pending;
            completed.last_message_at = Some(Utc::now());
            return Ok((completed.clone(), ConversationOutcome::Reopened));
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            organization_id,
            channel_id,
            contact_id,
            status: ConversationStatus::Pending,
            assigned_agent_id: None,
            last_message_at: Some(Utc::now()),
            first_response_at: None,
            created_at: Utc::now(),
        };
        conversations.push(conversation.clone());
        Ok((conversation, ConversationOutcome::Created))
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<ConversationWithRelations> {
        let conversation = self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("conversation {conversation_id}")))?;
        let contact = self
            .contacts
            .get(&conversation.contact_id)
            .map(|c| c.clone())
            .ok_or_else(|| AppError::not_found("contact"))?;
        let channel = self
            .channels
            .get(&conversation.channel_id)
            .map(|c| c.clone())
            .ok_or_else(|| AppError::not_found("channel"))?;
        Ok(ConversationWithRelations {
            assigned_agent: conversation.assigned_agent_id.map(|id| AgentSummary {
                id,
                display_name: id.to_string(),
            }),
            conversation,
            contact,
            channel,
        })
    }

    async fn list_conversations(
        &self,
        organization_id: Uuid,
        query: &ListConversationsQuery,
    ) -> AppResult<Page<ConversationWithRelations>> {
        let conversations = self.conversations.lock().unwrap();
        let search = query.search.as_deref().map(str::to_lowercase);
        let mut matches: Vec<Conversation> = conversations
            .iter()
            .filter(|c| c.organization_id == organization_id)
            .filter(|c| query.status.map(|s| s == c.status).unwrap_or(true))
            .filter(|c| {
                query
                    .assigned_agent_id
                    .map(|a| Some(a) == c.assigned_agent_id)
                    .unwrap_or(true)
            })
            .filter(|c| query.channel_id.map(|ch| ch == c.channel_id).unwrap_or(true))
            .filter(|c| match &search {
                None => true,
                Some(needle) => self.contacts.get(&c.contact_id).is_some_and(|contact| {
                    contact.display_name.as_deref().unwrap_or_default().to_lowercase().contains(needle.as_str())
                        || contact.provider_id.to_lowercase().contains(needle.as_str())
                }),
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at).then(b.created_at.cmp(&a.created_at)));
        let limit = query.effective_limit() as usize;
        matches.truncate(limit);

        let mut items = Vec::with_capacity(matches.len());
        for conversation in matches {
            let contact = self.contacts.get(&conversation.contact_id).map(|c| c.clone());
            let channel = self.channels.get(&conversation.channel_id).map(|c| c.clone());
            if let (Some(contact), Some(channel)) = (contact, channel) {
                items.push(ConversationWithRelations {
                    assigned_agent: conversation.assigned_agent_id.map(|id| AgentSummary {
                        id,
                        display_name: id.to_string(),
                    }),
                    conversation,
                    contact,
                    channel,
                });
            }
        }
        Ok(Page {
            items,
            next_cursor: None,
        })
    }

    async fn accept_conversation(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
    ) -> AppResult<Conversation> {
        let mut conversations = self.conversations.lock().unwrap();
        let conv = conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| AppError::not_found(format!("conversation {conversation_id}")))?;
        if conv.status != ConversationStatus::Pending {
            return Err(AppError::conflict("conversation is already assigned or completed"));
        }
        conv.status = ConversationStatus::Assigned;
        conv.assigned_agent_id = Some(agent_id);
        Ok(conv.clone())
    }

    async fn release_conversation(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
    ) -> AppResult<Conversation> {
        let mut conversations = self.conversations.lock().unwrap();
        let conv = conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| AppError::not_found(format!("conversation {conversation_id}")))?;
        if conv.status != ConversationStatus::Assigned || conv.assigned_agent_id != Some(agent_id) {
            return Err(AppError::conflict("conversation is not owned by this agent"));
        }
        conv.status = ConversationStatus::Pending;
        conv.assigned_agent_id = None;
        Ok(conv.clone())
    }

    async fn complete_conversation(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
    ) -> AppResult<Conversation> {
        let mut conversations = self.conversations.lock().unwrap();
        let conv = conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| AppError::not_found(format!("conversation {conversation_id}")))?;
        if conv.status != ConversationStatus::Assigned || conv.assigned_agent_id != Some(agent_id) {
            return Err(AppError::conflict("conversation is not owned by this agent"));
        }
        conv.status = ConversationStatus::Completed;
        conv.assigned_agent_id = None;
        Ok(conv.clone())
    }

    async fn release_all_for_agent(&self, agent_id: Uuid) -> AppResult<Vec<Conversation>> {
        let mut conversations = self.conversations.lock().unwrap();
        let mut released = Vec::new();
        for conv in conversations.iter_mut() {
            if conv.status == ConversationStatus::Assigned && conv.assigned_agent_id == Some(agent_id) {
                conv.status = ConversationStatus::Pending;
                conv.assigned_agent_id = None;
                released.push(conv.clone());
            }
        }
        Ok(released)
    }

    async fn insert_inbound_message(
        &self,
        conversation_id: Uuid,
        content: &InboundContent,
        provider_message_id: Option<&str>,
    ) -> AppResult<Inserted<Message>> {
        if let Some(pid) = provider_message_id {
            if let Some(existing) = self.find_message_by_provider_id(conversation_id, pid).await? {
                return Ok(Inserted { value: existing, was_new: false });
            }
        }
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            direction: MessageDirection::Inbound,
            agent_id: None,
            body: Some(content.preview()),
            media_ref: content.media_ref().map(str::to_string),
            provider_message_id: provider_message_id.map(str::to_string),
            status: MessageStatus::Delivered,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
        };
        self.messages.lock().unwrap().push(message.clone());
        if let Some(conv) = self
            .conversations
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            conv.last_message_at = Some(Utc::now());
        }
        Ok(Inserted { value: message, was_new: true })
    }

    async fn insert_outbound_message(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
        content: &OutboundContent,
    ) -> AppResult<Message> {
        let body = match content {
            OutboundContent::Text { body } => Some(body.clone()),
            _ => None,
        };
        let media_ref = match content {
            OutboundContent::Image { url, .. } | OutboundContent::Document { url, .. } => Some(url.clone()),
            OutboundContent::Text { .. } => None,
        };
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            direction: MessageDirection::Outbound,
            agent_id: Some(agent_id),
            body,
            media_ref,
            provider_message_id: None,
            status: MessageStatus::Pending,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
        };
        self.messages.lock().unwrap().push(message.clone());
        if let Some(conv) = self
            .conversations
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            conv.last_message_at = Some(Utc::now());
            conv.first_response_at.get_or_insert(Utc::now());
        }
        Ok(message)
    }

    async fn update_message_status(
        &self,
        message_id: Uuid,
        status: MessageStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> AppResult<Message> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| AppError::not_found(format!("message {message_id}")))?;
        if !message.status.can_advance_to(status) {
            return Err(AppError::conflict(format!(
                "cannot move message from {:?} to {:?}",
                message.status, status
            )));
        }
        message.status = status;
        message.error_code = error_code.map(str::to_string);
        message.error_message = error_message.map(str::to_string);
        Ok(message.clone())
    }

    async fn find_message_by_provider_id(
        &self,
        conversation_id: Uuid,
        provider_message_id: &str,
    ) -> AppResult<Option<Message>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| {
                m.conversation_id == conversation_id
                    && m.provider_message_id.as_deref() == Some(provider_message_id)
            })
            .cloned())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        query: &ListMessagesQuery,
    ) -> AppResult<Page<Message>> {
        let mut items: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(query.effective_limit() as usize);
        Ok(Page { items, next_cursor: None })
    }

    async fn append_event(
        &self,
        conversation_id: Uuid,
        event_type: ConversationEventType,
        actor_id: Option<Uuid>,
        metadata: Value,
    ) -> AppResult<ConversationEvent> {
        let event = ConversationEvent {
            id: Uuid::new_v4(),
            conversation_id,
            event_type,
            actor_id,
            metadata,
            created_at: Utc::now(),
        };
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }

    async fn record_failed_job(&self, queue: &str, payload: Value, error: &str, attempts: i32) -> AppResult<()> {
        self.failed_jobs.lock().unwrap().push(FailedJob {
            id: Uuid::new_v4(),
            queue: queue.to_string(),
            payload,
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_failed_jobs(&self, queue: Option<&str>) -> AppResult<Vec<FailedJob>> {
        let mut jobs: Vec<FailedJob> = self
            .failed_jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| queue.map(|q| q == j.queue).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        Ok(jobs)
    }

    async fn requeue_failed_job(&self, id: Uuid) -> AppResult<FailedJob> {
        let mut jobs = self.failed_jobs.lock().unwrap();
        let index = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| AppError::not_found(format!("failed job {id}")))?;
        Ok(jobs.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inbox_types::entities::ChannelStatus;

    fn seeded_store() -> (InMemoryStore, Uuid, Uuid) {
        let store = InMemoryStore::new();
        let organization_id = Uuid::new_v4();
        let channel = Channel {
            id: Uuid::new_v4(),
            organization_id,
            provider: Provider::A,
            config: serde_json::json!({ "phoneNumberId": "123" }),
            webhook_secret: "secret".into(),
            status: ChannelStatus::Active,
        };
        let channel_id = channel.id;
        store.seed_channel(channel);
        (store, organization_id, channel_id)
    }

    #[tokio::test]
    async fn accept_is_exclusive() {
        let (store, organization_id, channel_id) = seeded_store();
        let contact = store
            .upsert_contact(organization_id, Provider::A, "contact-1", None)
            .await
            .unwrap();
        let (conversation, _) = store
            .find_or_create_conversation(organization_id, channel_id, contact.id)
            .await
            .unwrap();

        let agent_a = Uuid::new_v4();
        let agent_b = Uuid::new_v4();

        store.accept_conversation(conversation.id, agent_a).await.unwrap();
        let second = store.accept_conversation(conversation.id, agent_b).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn find_or_create_conversation_distinguishes_created_existing_and_reopened() {
        let (store, organization_id, channel_id) = seeded_store();
        let contact = store
            .upsert_contact(organization_id, Provider::A, "contact-1", None)
            .await
            .unwrap();

        let (conversation, outcome) = store
            .find_or_create_conversation(organization_id, channel_id, contact.id)
            .await
            .unwrap();
        assert_eq!(outcome, ConversationOutcome::Created);

        let (same, outcome) = store
            .find_or_create_conversation(organization_id, channel_id, contact.id)
            .await
            .unwrap();
        assert_eq!(same.id, conversation.id);
        assert_eq!(outcome, ConversationOutcome::Existing);

        let agent_id = Uuid::new_v4();
        store.accept_conversation(conversation.id, agent_id).await.unwrap();
        store.complete_conversation(conversation.id, agent_id).await.unwrap();

        let (reopened, outcome) = store
            .find_or_create_conversation(organization_id, channel_id, contact.id)
            .await
            .unwrap();
        assert_eq!(reopened.id, conversation.id);
        assert_eq!(outcome, ConversationOutcome::Reopened);
    }

    #[tokio::test]
    async fn reopen_after_completion_reuses_conversation_id() {
        let (store, organization_id, channel_id) = seeded_store();
        let contact = store
            .upsert_contact(organization_id, Provider::A, "contact-1", None)
            .await
            .unwrap();
        let (first, _) = store
            .find_or_create_conversation(organization_id, channel_id, contact.id)
            .await
            .unwrap();
        let agent_id = Uuid::new_v4();
        store.accept_conversation(first.id, agent_id).await.unwrap();
        store.complete_conversation(first.id, agent_id).await.unwrap();

        let (reopened, outcome) = store
            .find_or_create_conversation(organization_id, channel_id, contact.id)
            .await
            .unwrap();
        assert_eq!(reopened.id, first.id);
        assert_eq!(outcome, ConversationOutcome::Reopened);
        assert_eq!(reopened.status, ConversationStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_provider_message_id_is_a_no_op() {
        let (store, organization_id, channel_id) = seeded_store();
        let contact = store
            .upsert_contact(organization_id, Provider::A, "contact-1", None)
            .await
            .unwrap();
        let (conversation, _) = store
            .find_or_create_conversation(organization_id, channel_id, contact.id)
            .await
            .unwrap();

        let content = InboundContent::Text { body: "hi".into() };
        let first = store
            .insert_inbound_message(conversation.id, &content, Some("wamid.1"))
            .await
            .unwrap();
        let second = store
            .insert_inbound_message(conversation.id, &content, Some("wamid.1"))
            .await
            .unwrap();

        assert!(first.was_new);
        assert!(!second.was_new);
        assert_eq!(first.value.id, second.value.id);
    }

    /// Exercises the exclusivity guarantee with real concurrent tasks
    /// racing on the same conversation, rather than two sequential calls.
    #[tokio::test]
    async fn concurrent_accept_attempts_yield_exactly_one_winner() {
        let (store, organization_id, channel_id) = seeded_store();
        let contact = store
            .upsert_contact(organization_id, Provider::A, "contact-1", None)
            .await
            .unwrap();
        let (conversation, _) = store
            .find_or_create_conversation(organization_id, channel_id, contact.id)
            .await
            .unwrap();

        let store = Arc::new(store);
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let conversation_id = conversation.id;
            tasks.push(tokio::spawn(async move {
                store.accept_conversation(conversation_id, Uuid::new_v4()).await
            }));
        }

        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn list_conversations_search_matches_contact_display_name() {
        let (store, organization_id, channel_id) = seeded_store();
        let alice = store
            .upsert_contact(organization_id, Provider::A, "contact-1", Some("Alice Example"))
            .await
            .unwrap();
        let bob = store
            .upsert_contact(organization_id, Provider::A, "contact-2", Some("Bob Other"))
            .await
            .unwrap();
        store
            .find_or_create_conversation(organization_id, channel_id, alice.id)
            .await
            .unwrap();
        store
            .find_or_create_conversation(organization_id, channel_id, bob.id)
            .await
            .unwrap();

        let query = ListConversationsQuery {
            search: Some("alice".into()),
            ..Default::default()
        };
        let page = store.list_conversations(organization_id, &query).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].contact.id, alice.id);
    }
}
