use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The two external messaging providers this system speaks to.
///
/// ```
/// use inbox_types::Provider;
/// assert_eq!(Provider::A.as_str(), "provider_a");
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// WhatsApp-style: phone-number-addressed, Cloud API shaped payloads.
    A,
    /// Messenger-style: page-addressed, Messenger Platform shaped payloads.
    B,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::A => "provider_a",
            Provider::B => "provider_b",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider_a" | "a" | "whatsapp" => Ok(Provider::A),
            "provider_b" | "b" | "messenger" => Ok(Provider::B),
            other => Err(format!("unknown provider {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelStatus {
    Active,
    Inactive,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub slug: String,
}

/// A configured connection to an external messaging provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub provider: Provider,
    /// Provider-shaped config (phone_number_id / page_id live inside here).
    pub config: Value,
    pub webhook_secret: String,
    pub status: ChannelStatus,
}

impl Channel {
    /// Returns the `appSecret` used for HMAC verification, when configured.
    pub fn app_secret(&self) -> Option<&str> {
        self.config.get("appSecret").and_then(Value::as_str)
    }

    /// Returns the provider-addressing id this channel answers to
    /// (`phoneNumberId` for provider A, `pageId` for provider B).
    pub fn addressing_id(&self) -> Option<&str> {
        let key = match self.provider {
            Provider::A => "phoneNumberId",
            Provider::B => "pageId",
        };
        self.config.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub provider: Provider,
    pub provider_id: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationStatus {
    Pending,
    Assigned,
    Completed,
}

/// A stateful thread between one contact and the organization, dispatched
/// to at most one agent at a time. See the state machine in the
/// conversation service module for the transition rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub channel_id: Uuid,
    pub contact_id: Uuid,
    pub status: ConversationStatus,
    pub assigned_agent_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// `status == ASSIGNED` and `assigned_agent_id` being set must always
    /// agree; this checks that invariant holds for a row just read back.
    pub fn ownership_consistent(&self) -> bool {
        match self.status {
            ConversationStatus::Assigned => self.assigned_agent_id.is_some(),
            ConversationStatus::Pending | ConversationStatus::Completed => {
                self.assigned_agent_id.is_none()
            }
        }
    }
}

/// Joined view returned by list/detail queries (see DESIGN.md: ORM-style
/// relations note) instead of an eagerly loaded object graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationWithRelations {
    pub conversation: Conversation,
    pub contact: Contact,
    pub channel: Channel,
    pub assigned_agent: Option<AgentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: Uuid,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Forward-only transition check for the status state machine (§4.4):
    /// PENDING -> SENT -> DELIVERED -> READ, with FAILED reachable from any
    /// non-terminal outbound state.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        match (self, next) {
            (Pending, Sent | Failed) => true,
            (Sent, Delivered | Failed) => true,
            (Delivered, Read | Failed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub direction: MessageDirection,
    pub agent_id: Option<Uuid>,
    pub body: Option<String>,
    pub media_ref: Option<String>,
    pub provider_message_id: Option<String>,
    pub status: MessageStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Event types appended to a conversation's append-only audit trail (§4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationEventType {
    Created,
    Accepted,
    Released,
    Completed,
    Reopened,
    AgentDisconnected,
    MessageReceived,
    MessageSent,
    MessageDelivered,
    MessageRead,
    MessageFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub event_type: ConversationEventType,
    pub actor_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentSessionStatus {
    Online,
    Away,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub connection_id: String,
    pub status: AgentSessionStatus,
    pub last_seen_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_conversation(status: ConversationStatus, assigned_agent_id: Option<Uuid>) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            channel_id: Uuid::new_v4(),
            contact_id: Uuid::new_v4(),
            status,
            assigned_agent_id,
            last_message_at: None,
            first_response_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn ownership_consistent_rejects_assigned_without_agent() {
        let conversation = sample_conversation(ConversationStatus::Assigned, None);
        assert!(!conversation.ownership_consistent());
    }

    #[test]
    fn ownership_consistent_rejects_pending_with_agent() {
        let conversation = sample_conversation(ConversationStatus::Pending, Some(Uuid::new_v4()));
        assert!(!conversation.ownership_consistent());
    }

    #[test]
    fn ownership_consistent_accepts_assigned_with_agent() {
        let conversation = sample_conversation(ConversationStatus::Assigned, Some(Uuid::new_v4()));
        assert!(conversation.ownership_consistent());
    }

    #[test]
    fn message_status_only_advances_forward() {
        use MessageStatus::*;
        assert!(Pending.can_advance_to(Sent));
        assert!(Sent.can_advance_to(Delivered));
        assert!(Delivered.can_advance_to(Read));
        assert!(Sent.can_advance_to(Failed));
        assert!(!Read.can_advance_to(Sent));
        assert!(!Delivered.can_advance_to(Pending));
        assert!(!Failed.can_advance_to(Sent));
    }
}

/// Authenticated agent identity, as yielded by the auth provider collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentIdentity {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: AgentRole,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Agent,
    Admin,
}

/// A job that exhausted its retry budget, kept for diagnostics and manual
/// requeue rather than silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub id: Uuid,
    pub queue: String,
    pub payload: Value,
    pub error: String,
    pub attempts: i32,
    pub failed_at: DateTime<Utc>,
}
