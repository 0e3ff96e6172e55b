use async_trait::async_trait;
use inbox_types::payload::OutboundContent;
use inbox_types::AppResult;
use serde_json::Value;

/// One normalized inbound message extracted from a provider's webhook
/// body, independent of how many such messages a single request batches.
pub struct NormalizedMessage {
    pub provider_id: String,
    pub display_name: Option<String>,
    pub provider_message_id: String,
    pub content: inbox_types::payload::InboundContent,
}

/// What a webhook adapter must do to plug into the processor: prove the
/// request is genuine, answer the subscription handshake, and turn the
/// provider's own JSON shape into [`NormalizedMessage`]s.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn verify_signature(&self, app_secret: &str, signature_header: Option<&str>, body: &[u8]) -> bool;

    /// Returns the `hub.challenge` response body when the verify token
    /// matches, or `None` to reject the handshake.
    fn verify_handshake(&self, verify_token_expected: &str, mode: &str, token: &str, challenge: &str) -> Option<String>;

    fn normalize(&self, body: &Value) -> Vec<NormalizedMessage>;

    /// Sends one outbound message to `recipient`, returning the
    /// provider's own message id on success.
    async fn send(&self, access_token: &str, recipient: &str, content: &OutboundContent) -> AppResult<String>;
}
