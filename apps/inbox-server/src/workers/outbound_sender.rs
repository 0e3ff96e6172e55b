use std::sync::Arc;
use std::time::Duration;

use inbox_types::entities::{ConversationEventType, MessageStatus};
use inbox_types::events::EventPayload;
use inbox_types::{AppError, AppResult};
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

use crate::jobs::OutboundJob;
use crate::state::AppState;

pub fn spawn(
    state: AppState,
    mut rx: mpsc::Receiver<OutboundJob>,
    concurrency: usize,
    max_attempts: u32,
    base_delay: Duration,
) {
    let limiter = Arc::new(Semaphore::new(concurrency));
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let state = state.clone();
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire_owned().await;
                run_with_retries(&state, job, max_attempts, base_delay).await;
            });
        }
    });
}

async fn run_with_retries(state: &AppState, mut job: OutboundJob, max_attempts: u32, base_delay: Duration) {
    loop {
        job.attempt += 1;
        match process(state, &job).await {
            Ok(()) => return,
            Err(err) if err.retryable() && job.attempt < max_attempts => {
                tracing::warn!(attempt = job.attempt, %err, "outbound send failed, retrying");
                tokio::time::sleep(base_delay * job.attempt).await;
            }
            Err(err) => {
                tracing::error!(%err, attempt = job.attempt, "outbound send failed terminally");
                let _ = state
                    .store
                    .update_message_status(
                        job.message_id,
                        MessageStatus::Failed,
                        Some("send_exhausted"),
                        Some(&err.to_string()),
                    )
                    .await;
                let payload = serde_json::json!({
                    "message_id": job.message_id,
                    "conversation_id": job.conversation_id,
                    "channel_id": job.channel_id,
                    "recipient_provider_id": job.recipient_provider_id,
                    "content": job.content,
                });
                let _ = state
                    .store
                    .record_failed_job("outbound", payload, &err.to_string(), job.attempt as i32)
                    .await;

                if let Ok(conversation) = state.store.get_conversation(job.conversation_id).await {
                    state
                        .bus
                        .publish(
                            conversation.conversation.organization_id,
                            EventPayload::MessageStatusChanged {
                                conversation_id: job.conversation_id,
                                message: failed_message_view(&job, &err),
                            },
                        )
                        .await;
                }
                return;
            }
        }
    }
}

fn failed_message_view(job: &OutboundJob, err: &AppError) -> inbox_types::entities::Message {
    inbox_types::entities::Message {
        id: job.message_id,
        conversation_id: job.conversation_id,
        direction: inbox_types::entities::MessageDirection::Outbound,
        agent_id: None,
        body: None,
        media_ref: None,
        provider_message_id: None,
        status: MessageStatus::Failed,
        error_code: Some("send_exhausted".into()),
        error_message: Some(err.to_string()),
        created_at: chrono::Utc::now(),
    }
}

async fn process(state: &AppState, job: &OutboundJob) -> AppResult<()> {
    let channel = state.store.get_channel(job.channel_id).await?;
    let adapter = state
        .providers
        .get(channel.provider)
        .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("no adapter for {:?}", channel.provider)))?;

    let access_token = channel
        .config
        .get("accessToken")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("channel missing accessToken")))?;

    let provider_message_id = adapter
        .send(access_token, &job.recipient_provider_id, &job.content)
        .await?;

    let message = state
        .store
        .update_message_status(job.message_id, MessageStatus::Sent, None, None)
        .await?;

    state
        .store
        .append_event(job.conversation_id, ConversationEventType::MessageSent, None, Value::Null)
        .await?;

    tracing::debug!(provider_message_id, "outbound message sent");

    state
        .bus
        .publish(
            channel.organization_id,
            EventPayload::MessageStatusChanged {
                conversation_id: job.conversation_id,
                message,
            },
        )
        .await;

    Ok(())
}
