use serde::{Deserialize, Serialize};

/// Normalized shape of an inbound message body, independent of which
/// provider it arrived from. Each provider adapter maps its own wire
/// format into one of these before the message ever reaches persistence.
///
/// ```
/// use inbox_types::payload::InboundContent;
///
/// let text = InboundContent::Text { body: "hi".into() };
/// let json = serde_json::to_value(&text).unwrap();
/// assert_eq!(json["type"], "text");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundContent {
    Text {
        body: String,
    },
    Image {
        url: String,
        caption: Option<String>,
    },
    Audio {
        url: String,
    },
    Video {
        url: String,
        caption: Option<String>,
    },
    Document {
        url: String,
        filename: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    /// Anything the adapter received but could not map to a richer
    /// variant; kept instead of dropped so the raw shape isn't lost.
    Fallback {
        raw: serde_json::Value,
    },
}

impl InboundContent {
    /// Best-effort plain-text rendering, used for conversation list
    /// previews and log lines.
    pub fn preview(&self) -> String {
        match self {
            InboundContent::Text { body } => body.clone(),
            InboundContent::Image { caption, .. } => {
                caption.clone().unwrap_or_else(|| "[image]".into())
            }
            InboundContent::Audio { .. } => "[audio]".into(),
            InboundContent::Video { caption, .. } => {
                caption.clone().unwrap_or_else(|| "[video]".into())
            }
            InboundContent::Document { filename, .. } => {
                filename.clone().unwrap_or_else(|| "[document]".into())
            }
            InboundContent::Location { .. } => "[location]".into(),
            InboundContent::Fallback { .. } => "[unsupported message]".into(),
        }
    }

    pub fn media_ref(&self) -> Option<&str> {
        match self {
            InboundContent::Image { url, .. }
            | InboundContent::Audio { url, .. }
            | InboundContent::Video { url, .. }
            | InboundContent::Document { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// What an agent can send back out. Narrower than `InboundContent` since
/// outbound sends are authored by agents, not received raw from a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundContent {
    Text { body: String },
    Image { url: String, caption: Option<String> },
    Document { url: String, filename: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_round_trips_arbitrary_json() {
        let raw = serde_json::json!({"weird": ["shape"]});
        let content = InboundContent::Fallback { raw: raw.clone() };
        let encoded = serde_json::to_value(&content).unwrap();
        let decoded: InboundContent = serde_json::from_value(encoded).unwrap();
        match decoded {
            InboundContent::Fallback { raw: got } => assert_eq!(got, raw),
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn preview_falls_back_to_placeholder() {
        let content = InboundContent::Audio {
            url: "https://example.com/a.ogg".into(),
        };
        assert_eq!(content.preview(), "[audio]");
    }
}
