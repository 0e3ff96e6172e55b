use anyhow::Result;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::store::CoordinationStore;

/// A message mirrored in from another instance via the coordination
/// store's pub/sub channel.
pub struct MirroredMessage {
    pub room: String,
    pub payload: String,
}

/// Subscribes to every room this namespace publishes to and forwards
/// messages onto an mpsc channel, so the event bus can treat remote and
/// local dispatch uniformly without holding a pub/sub connection itself.
pub async fn spawn_mirror(store: &CoordinationStore) -> Result<mpsc::Receiver<MirroredMessage>> {
    let pattern = format!("{}:room:*", store.namespace());
    let prefix = format!("{}:room:", store.namespace());
    let client = store.client();
    let (tx, rx) = mpsc::channel(1024);

    tokio::spawn(async move {
        loop {
            match client.get_async_pubsub().await {
                Ok(mut pubsub) => {
                    if let Err(err) = pubsub.psubscribe(&pattern).await {
                        tracing::error!(%err, "failed to subscribe to coordination channel");
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                        continue;
                    }
                    let mut stream = pubsub.on_message();
                    while let Some(msg) = stream.next().await {
                        let channel: String = msg.get_channel_name().to_string();
                        let Ok(payload) = msg.get_payload::<String>() else {
                            continue;
                        };
                        let room = channel.trim_start_matches(&prefix).to_string();
                        if tx
                            .send(MirroredMessage { room, payload })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(%err, "coordination pub/sub connection failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                }
            }
        }
    });

    Ok(rx)
}
