use async_trait::async_trait;
use inbox_types::payload::{InboundContent, OutboundContent};
use inbox_types::{AppError, AppResult};
use serde_json::Value;

use crate::signature::verify_hub_signature;
use crate::traits::{NormalizedMessage, ProviderAdapter};

/// WhatsApp Cloud-API-shaped adapter: phone-number addressed contacts,
/// `entry[].changes[].value.messages[]` webhook bodies.
pub struct ProviderA {
    http: reqwest::Client,
    api_base: String,
}

impl ProviderA {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }
}

fn content_from_message(message: &Value) -> Option<InboundContent> {
    let kind = message.get("type").and_then(Value::as_str).unwrap_or("text");
    match kind {
        "text" => {
            let body = message.get("text")?.get("body")?.as_str()?.to_string();
            Some(InboundContent::Text { body })
        }
        "image" => Some(InboundContent::Image {
            url: message.get("image")?.get("id")?.as_str()?.to_string(),
            caption: message
                .get("image")
                .and_then(|i| i.get("caption"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        "audio" => Some(InboundContent::Audio {
            url: message.get("audio")?.get("id")?.as_str()?.to_string(),
        }),
        "video" => Some(InboundContent::Video {
            url: message.get("video")?.get("id")?.as_str()?.to_string(),
            caption: message
                .get("video")
                .and_then(|v| v.get("caption"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        "document" => Some(InboundContent::Document {
            url: message.get("document")?.get("id")?.as_str()?.to_string(),
            filename: message
                .get("document")
                .and_then(|d| d.get("filename"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        "location" => {
            let loc = message.get("location")?;
            Some(InboundContent::Location {
                latitude: loc.get("latitude")?.as_f64()?,
                longitude: loc.get("longitude")?.as_f64()?,
            })
        }
        _ => Some(InboundContent::Fallback { raw: message.clone() }),
    }
}

fn messages_from_body(body: &Value) -> Vec<NormalizedMessage> {
    let mut out = Vec::new();
    let Some(entries) = body.get("entry").and_then(Value::as_array) else {
        return out;
    };
    for entry in entries {
        let Some(changes) = entry.get("changes").and_then(Value::as_array) else {
            continue;
        };
        for change in changes {
            let Some(value) = change.get("value") else {
                continue;
            };
            let Some(messages) = value.get("messages").and_then(Value::as_array) else {
                continue;
            };
            for message in messages {
                let Some(from) = message.get("from").and_then(Value::as_str) else {
                    continue;
                };
                let Some(msg_id) = message.get("id").and_then(Value::as_str) else {
                    continue;
                };
                let Some(content) = content_from_message(message) else {
                    continue;
                };
                out.push(NormalizedMessage {
                    provider_id: from.to_string(),
                    display_name: None,
                    provider_message_id: msg_id.to_string(),
                    content,
                });
            }
        }
    }
    out
}

#[async_trait]
impl ProviderAdapter for ProviderA {
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
        let payload = match content {
            OutboundContent::Text { body } => serde_json::json!({
                "messaging_product": "whatsapp",
                "to": recipient,
                "type": "text",
                "text": { "body": body },
            }),
            OutboundContent::Image { url, caption } => serde_json::json!({
                "messaging_product": "whatsapp",
                "to": recipient,
                "type": "image",
                "image": { "link": url, "caption": caption },
            }),
            OutboundContent::Document { url, filename } => serde_json::json!({
                "messaging_product": "whatsapp",
                "to": recipient,
                "type": "document",
                "document": { "link": url, "filename": filename },
            }),
        };

        let response = self
            .http
            .post(format!("{}/messages", self.api_base))
            .bearer_auth(access_token)
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
        body.get("messages")
            .and_then(|m| m.as_array())
            .and_then(|arr| arr.first())
            .and_then(|first| first.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::provider("unexpected_response", "missing message id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_extracts_text_message() {
        let body = serde_json::json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": "15550001111",
                            "id": "wamid.abc",
                            "type": "text",
                            "text": { "body": "hello" },
                        }]
                    }
                }]
            }]
        });
        let messages = messages_from_body(&body);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].provider_id, "15550001111");
        match &messages[0].content {
            InboundContent::Text { body } => assert_eq!(body, "hello"),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn normalize_ignores_entries_without_messages() {
        let body = serde_json::json!({ "entry": [{ "changes": [{ "value": {} }] }] });
        assert!(messages_from_body(&body).is_empty());
    }

    #[test]
    fn verify_handshake_rejects_wrong_token() {
        let adapter = ProviderA::new("https://example.test");
        assert!(adapter
            .verify_handshake("expected", "subscribe", "wrong", "chal")
            .is_none());
    }
}
