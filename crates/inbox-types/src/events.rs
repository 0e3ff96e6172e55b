use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Conversation, Message};

/// Rooms a subscriber can join on the socket gateway. An event is fanned
/// out to every room it names, both on this instance's local dispatcher
/// and (via the coordination store mirror) on every other instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Organization(Uuid),
    Agent(Uuid),
    Conversation(Uuid),
}

impl Room {
    pub fn key(&self) -> String {
        match self {
            Room::Organization(id) => format!("org:{id}"),
            Room::Agent(id) => format!("user:{id}"),
            Room::Conversation(id) => format!("conv:{id}"),
        }
    }
}

/// Realtime events dispatched over the socket gateway. Distinct from
/// `ConversationEventType`, which is the persisted audit trail: this enum
/// also carries transient events (typing, presence) that are never
/// written to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ConversationCreated { conversation: Conversation },
    ConversationAccepted { conversation: Conversation },
    ConversationReleased { conversation: Conversation },
    ConversationCompleted { conversation: Conversation },
    ConversationReopened { conversation: Conversation },
    ConversationUpdated { conversation: Conversation },
    MessageReceived { conversation_id: Uuid, message: Message },
    MessageStatusChanged { conversation_id: Uuid, message: Message },
    AgentTyping { conversation_id: Uuid, agent_id: Uuid, expires_at: DateTime<Utc> },
    PresenceUpdated { agent_id: Uuid, status: String },
}

impl EventPayload {
    /// Rooms this event should be delivered to. Conversation-scoped
    /// events also reach the owning organization's room so supervisors
    /// watching the whole org see activity without joining every thread.
    pub fn rooms(&self, organization_id: Uuid) -> Vec<Room> {
        match self {
            EventPayload::ConversationCreated { conversation }
            | EventPayload::ConversationAccepted { conversation }
            | EventPayload::ConversationReleased { conversation }
            | EventPayload::ConversationCompleted { conversation }
            | EventPayload::ConversationReopened { conversation }
            | EventPayload::ConversationUpdated { conversation } => vec![
                Room::Organization(organization_id),
                Room::Conversation(conversation.id),
            ],
            EventPayload::MessageReceived { conversation_id, .. }
            | EventPayload::MessageStatusChanged { conversation_id, .. }
            | EventPayload::AgentTyping { conversation_id, .. } => vec![
                Room::Organization(organization_id),
                Room::Conversation(*conversation_id),
            ],
            EventPayload::PresenceUpdated { agent_id, .. } => vec![
                Room::Organization(organization_id),
                Room::Agent(*agent_id),
            ],
        }
    }
}

/// Envelope carried over the coordination store's pub/sub mirror so other
/// instances can re-derive which local rooms to fan the event into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub organization_id: Uuid,
    pub payload: EventPayload,
}
