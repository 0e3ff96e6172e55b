use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::ConversationStatus;
use crate::payload::OutboundContent;
use crate::validate::{non_empty, Violations};

/// Query params on `GET /webhooks/:provider/:channel_id` used during the
/// provider's subscription handshake.
#[derive(Debug, Deserialize)]
pub struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub hub_mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub hub_challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub hub_verify_token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListConversationsQuery {
    pub status: Option<ConversationStatus>,
    pub channel_id: Option<Uuid>,
    pub assigned_agent_id: Option<Uuid>,
    pub search: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

impl ListConversationsQuery {
    pub const DEFAULT_LIMIT: u32 = 25;
    pub const MAX_LIMIT: u32 = 100;

    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListMessagesQuery {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

impl ListMessagesQuery {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 200;

    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: OutboundContent,
}

impl SendMessageRequest {
    pub fn validate(&self) -> Result<(), Vec<crate::validate::ValidationIssue>> {
        let mut violations = Violations::new();
        if let OutboundContent::Text { body } = &self.content {
            non_empty(body, "content.body", &mut violations);
        }
        violations.into_result()
    }
}

/// Empty-bodied requests (accept/release/complete) still get a struct so
/// handlers share the same extractor shape as the rest of the surface.
#[derive(Debug, Deserialize, Default)]
pub struct AcceptConversationRequest {}

#[derive(Debug, Deserialize, Default)]
pub struct ReleaseConversationRequest {}

#[derive(Debug, Deserialize, Default)]
pub struct CompleteConversationRequest {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_rejects_empty_text_body() {
        let req = SendMessageRequest {
            content: OutboundContent::Text { body: "   ".into() },
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn list_conversations_clamps_limit_to_max() {
        let query = ListConversationsQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), ListConversationsQuery::MAX_LIMIT);
    }
}
