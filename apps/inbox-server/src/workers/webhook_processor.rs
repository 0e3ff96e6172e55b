use std::sync::Arc;
use std::time::Duration;

use inbox_persistence::traits::ConversationOutcome;
use inbox_types::entities::ConversationEventType;
use inbox_types::events::EventPayload;
use inbox_types::{AppError, AppResult};
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

use crate::jobs::WebhookJob;
use crate::state::AppState;

/// Drains the webhook job queue with at most `concurrency` jobs in
/// flight at once, so one slow provider call can't starve the others.
pub fn spawn(
    state: AppState,
    mut rx: mpsc::Receiver<WebhookJob>,
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

async fn run_with_retries(state: &AppState, mut job: WebhookJob, max_attempts: u32, base_delay: Duration) {
    loop {
        job.attempt += 1;
        match process(state, &job).await {
            Ok(()) => return,
            Err(err) if err.retryable() && job.attempt < max_attempts => {
                tracing::warn!(attempt = job.attempt, %err, "webhook job failed, retrying");
                tokio::time::sleep(base_delay * job.attempt).await;
            }
            Err(err) => {
                tracing::error!(%err, attempt = job.attempt, "webhook job failed terminally");
                let payload = serde_json::json!({
                    "channel_id": job.channel_id,
                    "raw_body": job.raw_body,
                });
                let _ = state
                    .store
                    .record_failed_job("webhook", payload, &err.to_string(), job.attempt as i32)
                    .await;
                return;
            }
        }
    }
}

async fn process(state: &AppState, job: &WebhookJob) -> AppResult<()> {
    let channel = state.store.get_channel(job.channel_id).await?;
    let adapter = state
        .providers
        .get(channel.provider)
        .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("no adapter for {:?}", channel.provider)))?;

    for message in adapter.normalize(&job.raw_body) {
        let idem_key = format!("{}:{}", job.channel_id, message.provider_message_id);
        let is_new_claim = state
            .coordination
            .claim_idempotency_key(&idem_key, 86_400)
            .await
            .unwrap_or(true);
        if !is_new_claim {
            continue;
        }

        let contact = state
            .store
            .upsert_contact(
                channel.organization_id,
                channel.provider,
                &message.provider_id,
                message.display_name.as_deref(),
            )
            .await?;

        let (conversation, outcome) = state
            .store
            .find_or_create_conversation(channel.organization_id, channel.id, contact.id)
            .await?;

        let inserted = state
            .store
            .insert_inbound_message(
                conversation.id,
                &message.content,
                Some(&message.provider_message_id),
            )
            .await?;

        if !inserted.was_new {
            continue;
        }

        match outcome {
            ConversationOutcome::Created => {
                state
                    .store
                    .append_event(conversation.id, ConversationEventType::Created, None, Value::Null)
                    .await?;
                state
                    .bus
                    .publish(
                        channel.organization_id,
                        EventPayload::ConversationCreated {
                            conversation: conversation.clone(),
                        },
                    )
                    .await;
            }
            ConversationOutcome::Reopened => {
                state
                    .store
                    .append_event(conversation.id, ConversationEventType::Reopened, None, Value::Null)
                    .await?;
                state
                    .bus
                    .publish(
                        channel.organization_id,
                        EventPayload::ConversationReopened {
                            conversation: conversation.clone(),
                        },
                    )
                    .await;
            }
            ConversationOutcome::Existing => {}
        }

        state
            .store
            .append_event(
                conversation.id,
                ConversationEventType::MessageReceived,
                None,
                Value::Null,
            )
            .await?;

        state
            .bus
            .publish(
                channel.organization_id,
                EventPayload::MessageReceived {
                    conversation_id: conversation.id,
                    message: inserted.value,
                },
            )
            .await;

        state
            .bus
            .publish(
                channel.organization_id,
                EventPayload::ConversationUpdated {
                    conversation: conversation.clone(),
                },
            )
            .await;
    }

    Ok(())
}
