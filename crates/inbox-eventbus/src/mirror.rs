use std::sync::Arc;

use inbox_types::events::EventEnvelope;
use tokio::sync::mpsc;

use crate::bus::EventBus;

/// Drains mirrored messages from the coordination store's pub/sub and
/// re-dispatches them into this instance's local [`EventBus`]. Decoding
/// failures are logged and skipped rather than killing the drain loop.
pub fn spawn_bridge(bus: Arc<EventBus>, mut rx: mpsc::Receiver<inbox_coordination::MirroredMessage>) {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match serde_json::from_str::<EventEnvelope>(&message.payload) {
                Ok(envelope) => bus.apply_remote(&message.room, envelope.payload),
                Err(err) => tracing::warn!(%err, "failed to decode mirrored event"),
            }
        }
    });
}
