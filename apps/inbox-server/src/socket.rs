use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use inbox_types::events::{EventPayload, Room};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

/// JWT is passed as a query parameter since the WebSocket upgrade request
/// is a plain GET and cannot reliably carry an Authorization header across
/// every client environment agents connect from.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

struct Connection {
    agent_id: Uuid,
}

/// Tracks every live socket connection so events can be routed to the
/// right sockets and so a disconnect can release whatever conversations
/// the agent held.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Connection>,
    senders: DashMap<Uuid, mpsc::UnboundedSender<String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, connection_id: Uuid, agent_id: Uuid, tx: mpsc::UnboundedSender<String>) {
        self.connections.insert(connection_id, Connection { agent_id });
        self.senders.insert(connection_id, tx);
    }

    fn remove(&self, connection_id: Uuid) -> Option<Uuid> {
        self.senders.remove(&connection_id);
        self.connections.remove(&connection_id).map(|(_, c)| c.agent_id)
    }

    pub fn send_to_agent(&self, agent_id: Uuid, payload: &str) {
        for entry in self.connections.iter() {
            if entry.agent_id == agent_id {
                if let Some(tx) = self.senders.get(entry.key()) {
                    let _ = tx.send(payload.to_string());
                }
            }
        }
    }
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let identity = match state.auth.verify(&params.token) {
        Ok(identity) => identity,
        Err(_) => return (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

async fn handle_socket(socket: WebSocket, identity: inbox_types::entities::AgentIdentity, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let connection_id = Uuid::new_v4();
    state
        .connections
        .add(connection_id, identity.user_id, tx);

    let mut org_rx = state.bus.subscribe(&Room::Organization(identity.organization_id));
    let mut agent_rx = state.bus.subscribe(&Room::Agent(identity.user_id));

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let agent_id = identity.user_id;
    let relay_state = state.clone();
    let mut relay_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = org_rx.recv() => {
                    match event {
                        Ok(event) => forward_event(&relay_state, connection_id, &event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }
                event = agent_rx.recv() => {
                    match event {
                        Ok(event) => forward_event(&relay_state, connection_id, &event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            match ws_receiver.next().await {
                Some(Ok(Message::Text(text))) => {
                    handle_client_frame(&recv_state, agent_id, &text).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => { recv_task.abort(); relay_task.abort(); }
        _ = &mut recv_task => { send_task.abort(); relay_task.abort(); }
        _ = &mut relay_task => { send_task.abort(); recv_task.abort(); }
    }

    if state.connections.remove(connection_id).is_some() {
        if let Ok(released) = state.store.release_all_for_agent(agent_id).await {
            for conversation in released {
                state
                    .bus
                    .publish(
                        conversation.organization_id,
                        EventPayload::ConversationReleased { conversation },
                    )
                    .await;
            }
        }
    }
}

fn forward_event(state: &AppState, connection_id: Uuid, event: &EventPayload) {
    let Ok(encoded) = serde_json::to_string(event) else {
        return;
    };
    if let Some(tx) = state.connections.senders.get(&connection_id) {
        let _ = tx.send(encoded);
    }
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ClientFrame {
    Typing { conversation_id: Uuid },
}

async fn handle_client_frame(state: &AppState, agent_id: Uuid, text: &str) {
    let Ok(frame) = serde_json::from_str::<ClientFrame>(text) else {
        return;
    };
    match frame {
        ClientFrame::Typing { conversation_id } => {
            let Ok(conversation) = state.store.get_conversation(conversation_id).await else {
                return;
            };
            state
                .bus
                .publish(
                    conversation.conversation.organization_id,
                    EventPayload::AgentTyping {
                        conversation_id,
                        agent_id,
                        expires_at: Utc::now() + chrono::Duration::seconds(6),
                    },
                )
                .await;
        }
    }
}
