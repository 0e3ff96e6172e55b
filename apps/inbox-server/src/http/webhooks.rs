use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use inbox_types::dto::WebhookVerifyQuery;
use inbox_types::validate::ValidationIssue;
use inbox_types::AppError;
use serde_json::Value;
use uuid::Uuid;

use crate::jobs::WebhookJob;
use crate::state::AppState;

/// `GET /webhooks/:channel_id` — the provider's subscription handshake.
/// Responds with the raw `hub.challenge` body (not JSON) on success, the
/// shape every Graph-API-family webhook verifier expects.
pub async fn verify(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<WebhookVerifyQuery>,
) -> Result<impl IntoResponse, AppError> {
    let channel = state.store.get_channel(channel_id).await?;
    let (Some(mode), Some(token), Some(challenge)) =
        (query.hub_mode, query.hub_verify_token, query.hub_challenge)
    else {
        return Err(AppError::Validation(vec![ValidationIssue::new(
            "query",
            "hub.mode, hub.verify_token and hub.challenge are all required",
        )]));
    };

    let adapter = state
        .providers
        .get(channel.provider)
        .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("no adapter registered")))?;

    match adapter.verify_handshake(&state.config.webhook_verify_token, &mode, &token, &challenge) {
        Some(challenge) => Ok(challenge.into_response()),
        None => Err(AppError::Authz("verify token mismatch".into())),
    }
}

/// `POST /webhooks/:channel_id` — a provider delivery. The signature is
/// checked synchronously (cheap, and rejecting forged requests early
/// keeps them out of the job queue); everything else happens on the
/// webhook worker pool so a slow downstream never blocks this response.
pub async fn receive(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<StatusCode, AppError> {
    let channel = state.store.get_channel(channel_id).await?;
    let adapter = state
        .providers
        .get(channel.provider)
        .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("no adapter registered")))?;

    let app_secret = channel
        .app_secret()
        .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("channel missing appSecret")))?;
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok());

    if !adapter.verify_signature(app_secret, signature, &body) {
        return Err(AppError::Authz("invalid webhook signature".into()));
    }

    let raw_body: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(vec![ValidationIssue::new("body", e.to_string())]))?;

    let job = WebhookJob {
        channel_id,
        raw_body,
        attempt: 0,
    };

    if state.webhook_jobs.send(job).await.is_err() {
        return Err(AppError::Fatal(anyhow::anyhow!("webhook queue is closed")));
    }

    Ok(StatusCode::OK)
}
