use async_trait::async_trait;
use inbox_types::payload::{InboundContent, OutboundContent};
use inbox_types::{AppError, AppResult};
use serde_json::Value;

use crate::signature::verify_hub_signature;
use crate::traits::{NormalizedMessage, ProviderAdapter};

/// Messenger-Platform-shaped adapter: page-addressed contacts,
/// `entry[].messaging[]` webhook bodies with a `sender.id`/`message` pair.
pub struct ProviderB {
    http: reqwest::Client,
    api_base: String,
}

impl ProviderB {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }
}

fn content_from_message(message: &Value) -> Option<InboundContent> {
    if let Some(text) = message.get("text").and_then(Value::as_str) {
        return Some(InboundContent::Text { body: text.to_string() });
    }
    let attachment = message
        .get("attachments")
        .and_then(Value::as_array)
        .and_then(|a| a.first())?;
    let kind = attachment.get("type").and_then(Value::as_str)?;
    let url = attachment
        .get("payload")
        .and_then(|p| p.get("url"))
        .and_then(Value::as_str)?
        .to_string();
    match kind {
        "image" => Some(InboundContent::Image { url, caption: None }),
        "audio" => Some(InboundContent::Audio { url }),
        "video" => Some(InboundContent::Video { url, caption: None }),
        "file" => Some(InboundContent::Document { url, filename: None }),
        _ => Some(InboundContent::Fallback { raw: message.clone() }),
    }
}

fn messages_from_body(body: &Value) -> Vec<NormalizedMessage> {
    let mut out = Vec::new();
    let Some(entries) = body.get("entry").and_then(Value::as_array) else {
        return out;
    };
    for entry in entries {
        let Some(events) = entry.get("messaging").and_then(Value::as_array) else {
            continue;
        };
        for event in events {
            let Some(sender_id) = event
                .get("sender")
                .and_then(|s| s.get("id"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let Some(message) = event.get("message") else {
                continue;
            };
            // Messenger echoes the agent's own outbound sends back as a
            // webhook event; those carry `is_echo: true` and must not be
            // treated as a new inbound message.
            if message.get("is_echo").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let Some(mid) = message.get("mid").and_then(Value::as_str) else {
                continue;
            };
            let Some(content) = content_from_message(message) else {
                continue;
            };
            out.push(NormalizedMessage {
                provider_id: sender_id.to_string(),
                display_name: None,
                provider_message_id: mid.to_string(),
                content,
            });
        }
    }
    out
}

#[async_trait]
impl ProviderAdapter for ProviderB {
    fn verify_signature(&self, app_secret: &str, signature_header: Option<&str>, body: &[u8]) -> bool {
        verify_hub_signature(app_secret, signature_header, body)
    }

    fn verify_handshake(&self, verify_token_expected: &str, mode: &str, token: &str, challenge: &str) -> Option<String> {
        if mode == "subscribe" && token == verify_token_expected {
            Some(challenge.to_string())
        } else {
            None
        }
    }

    fn normalize(&self, body: &Value) -> Vec<NormalizedMessage> {
        messages_from_body(body)
    }

    async fn send(&self, access_token: &str, recipient: &str, content: &OutboundContent) -> AppResult<String> {
        let message = match content {
            OutboundContent::Text { body } => serde_json::json!({ "text": body }),
            OutboundContent::Image { url, .. } => serde_json::json!({
                "attachment": { "type": "image", "payload": { "url": url } }
            }),
            OutboundContent::Document { url, .. } => serde_json::json!({
                "attachment": { "type": "file", "payload": { "url": url } }
            }),
        };
        let payload = serde_json::json!({
            "recipient": { "id": recipient },
            "message": message,
        });

        let response = self
            .http
            .post(format!("{}/messages", self.api_base))
            .query(&[("access_token", access_token)])
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Transient(e.into()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, "provider send rejected");
            return Err(AppError::provider(status.as_str(), body));
        }

        let body: Value = response.json().await.map_err(|e| AppError::Transient(e.into()))?;
        body.get("message_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::provider("unexpected_response", "missing message_id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_extracts_text_message() {
        let body = serde_json::json!({
            "entry": [{
                "messaging": [{
                    "sender": { "id": "1001" },
                    "message": { "mid": "m.1", "text": "hi there" },
                }]
            }]
        });
        let messages = messages_from_body(&body);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].provider_message_id, "m.1");
    }

    #[test]
    fn normalize_skips_echoed_outbound_messages() {
        let body = serde_json::json!({
            "entry": [{
                "messaging": [{
                    "sender": { "id": "1001" },
                    "message": { "mid": "m.1", "text": "hi", "is_echo": true },
                }]
            }]
        });
        assert!(messages_from_body(&body).is_empty());
    }

    #[test]
    fn normalize_maps_image_attachment() {
        let body = serde_json::json!({
            "entry": [{
                "messaging": [{
                    "sender": { "id": "1001" },
                    "message": {
                        "mid": "m.2",
                        "attachments": [{ "type": "image", "payload": { "url": "https://example.com/a.jpg" } }]
                    },
                }]
            }]
        });
        let messages = messages_from_body(&body);
        match &messages[0].content {
            InboundContent::Image { url, .. } => assert_eq!(url, "https://example.com/a.jpg"),
            other => panic!("unexpected content: {other:?}"),
        }
    }
}
