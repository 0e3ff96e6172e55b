use std::sync::Arc;

use dashmap::DashMap;
use inbox_coordination::CoordinationStore;
use inbox_types::events::{EventEnvelope, EventPayload, Room};
use tokio::sync::broadcast;

/// Capacity of each room's broadcast channel. A slow subscriber that
/// falls this far behind drops the oldest events rather than blocking
/// publishers; the socket gateway re-syncs state on reconnect anyway.
const ROOM_CAPACITY: usize = 256;

/// Fans events out to every local subscriber of the rooms they target,
/// and mirrors them through the coordination store so other instances'
/// subscribers receive the same events.
pub struct EventBus {
    rooms: DashMap<String, broadcast::Sender<EventPayload>>,
    coordination: Option<Arc<CoordinationStore>>,
}

impl EventBus {
    pub fn new(coordination: Option<Arc<CoordinationStore>>) -> Self {
        Self {
            rooms: DashMap::new(),
            coordination,
        }
    }

    fn sender_for(&self, room_key: &str) -> broadcast::Sender<EventPayload> {
        self.rooms
            .entry(room_key.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .clone()
    }

    pub fn subscribe(&self, room: &Room) -> broadcast::Receiver<EventPayload> {
        self.sender_for(&room.key()).subscribe()
    }

    /// Delivers locally and, when a coordination store is configured,
    /// publishes for other instances to re-dispatch via [`apply_remote`].
    pub async fn publish(&self, organization_id: uuid::Uuid, payload: EventPayload) {
        self.dispatch_local(organization_id, &payload);

        if let Some(store) = &self.coordination {
            let envelope = EventEnvelope {
                organization_id,
                payload,
            };
            match serde_json::to_string(&envelope) {
                Ok(encoded) => {
                    for room in envelope.payload.rooms(organization_id) {
                        if let Err(err) = store.publish(&room.key(), &encoded).await {
                            tracing::warn!(%err, room = %room.key(), "failed to mirror event");
                        }
                    }
                }
                Err(err) => tracing::error!(%err, "failed to encode event envelope"),
            }
        }
    }

    fn dispatch_local(&self, organization_id: uuid::Uuid, payload: &EventPayload) {
        for room in payload.rooms(organization_id) {
            let sender = self.sender_for(&room.key());
            // No local subscribers is the common case for quiet rooms;
            // `send` erroring just means that, not a failure to report.
            let _ = sender.send(payload.clone());
        }
    }

    /// Re-dispatches an event mirrored in from another instance. Called
    /// from the task draining [`inbox_coordination::spawn_mirror`].
    pub fn apply_remote(&self, room_key: &str, payload: EventPayload) {
        let sender = self.sender_for(room_key);
        let _ = sender.send(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inbox_types::entities::{Conversation, ConversationStatus};
    use uuid::Uuid;

    fn sample_conversation(organization_id: Uuid) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            organization_id,
            channel_id: Uuid::new_v4(),
            contact_id: Uuid::new_v4(),
            status: ConversationStatus::Pending,
            assigned_agent_id: None,
            last_message_at: None,
            first_response_at: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_in_org_room_receives_conversation_event() {
        let bus = EventBus::new(None);
        let organization_id = Uuid::new_v4();
        let mut rx = bus.subscribe(&Room::Organization(organization_id));

        let conversation = sample_conversation(organization_id);
        bus.publish(
            organization_id,
            EventPayload::ConversationCreated { conversation },
        )
        .await;

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, EventPayload::ConversationCreated { .. }));
    }

    #[tokio::test]
    async fn subscriber_in_unrelated_conversation_room_receives_nothing() {
        let bus = EventBus::new(None);
        let organization_id = Uuid::new_v4();
        let mut rx = bus.subscribe(&Room::Conversation(Uuid::new_v4()));

        bus.publish(
            organization_id,
            EventPayload::ConversationCreated {
                conversation: sample_conversation(organization_id),
            },
        )
        .await;

        assert!(rx.try_recv().is_err());
    }
}
