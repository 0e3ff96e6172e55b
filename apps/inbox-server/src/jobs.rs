use inbox_types::payload::OutboundContent;
use serde_json::Value;
use uuid::Uuid;

/// Queued unit of work for the webhook processor pool: a single webhook
/// delivery to verify, normalize, and persist. Kept separate from the
/// HTTP handler so a slow or failing provider can't block the request
/// that received the webhook.
#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub channel_id: Uuid,
    pub raw_body: Value,
    pub attempt: u32,
}

/// Queued unit of work for the outbound sender pool: one message an agent
/// asked to be delivered to a provider.
#[derive(Debug, Clone)]
pub struct OutboundJob {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub channel_id: Uuid,
    pub recipient_provider_id: String,
    pub content: OutboundContent,
    pub attempt: u32,
}
