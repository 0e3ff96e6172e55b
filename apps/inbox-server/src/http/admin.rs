use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use inbox_types::entities::{AgentRole, FailedJob};
use inbox_types::{AppError, AppResult};
use serde::Deserialize;
use uuid::Uuid;

use crate::http::auth_extract::identity_from_headers;
use crate::jobs::{OutboundJob, WebhookJob};
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ListFailedJobsQuery {
    pub queue: Option<String>,
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let identity = identity_from_headers(state, headers)?;
    if identity.role != AgentRole::Admin {
        return Err(AppError::authz("admin role required"));
    }
    Ok(())
}

pub async fn list_failed_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListFailedJobsQuery>,
) -> AppResult<Json<Vec<FailedJob>>> {
    require_admin(&state, &headers)?;
    let jobs = state.store.list_failed_jobs(query.queue.as_deref()).await?;
    Ok(Json(jobs))
}

/// Re-enqueues a failed job's payload onto the live worker pool it came
/// from. The diagnostic row is removed on requeue rather than kept around,
/// since a successful redelivery makes it stale.
pub async fn requeue_failed_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    require_admin(&state, &headers)?;
    let job = state.store.requeue_failed_job(id).await?;

    match job.queue.as_str() {
        "webhook" => {
            let channel_id = job
                .payload
                .get("channel_id")
                .and_then(serde_json::Value::as_str)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("failed job missing channel_id")))?;
            let raw_body = job
                .payload
                .get("raw_body")
                .cloned()
                .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("failed job missing raw_body")))?;
            let requeued = WebhookJob {
                channel_id,
                raw_body,
                attempt: 0,
            };
            state
                .webhook_jobs
                .send(requeued)
                .await
                .map_err(|_| AppError::Fatal(anyhow::anyhow!("webhook queue is closed")))?;
        }
        "outbound" => {
            let field = |name: &'static str| {
                job.payload
                    .get(name)
                    .and_then(serde_json::Value::as_str)
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("failed job missing {name}")))
            };
            let message_id: Uuid = field("message_id")?;
            let conversation_id: Uuid = field("conversation_id")?;
            let channel_id: Uuid = field("channel_id")?;
            let recipient_provider_id = job
                .payload
                .get("recipient_provider_id")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("failed job missing recipient_provider_id")))?
                .to_string();
            let content = job
                .payload
                .get("content")
                .cloned()
                .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("failed job missing content")))?;
            let content = serde_json::from_value(content)
                .map_err(|e| AppError::Fatal(anyhow::anyhow!("failed job content undecodable: {e}")))?;

            let requeued = OutboundJob {
                message_id,
                conversation_id,
                channel_id,
                recipient_provider_id,
                content,
                attempt: 0,
            };
            state
                .outbound_jobs
                .send(requeued)
                .await
                .map_err(|_| AppError::Fatal(anyhow::anyhow!("outbound queue is closed")))?;
        }
        other => return Err(AppError::Fatal(anyhow::anyhow!("unknown job queue {other}"))),
    }

    Ok(Json(serde_json::json!({ "requeued": true })))
}
